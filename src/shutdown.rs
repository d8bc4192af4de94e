//! Cooperative stop signal shared by the scheduler and the running cycle.

use std::future::Future;
use tokio::sync::watch;

/// Receiver side. Cheap to clone; every clone observes the same trigger.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sender side. Dropping it without triggering means no stop will ever be requested.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// A signal that never fires, for one-shot runs.
    pub fn never() -> Shutdown {
        let (_trigger, shutdown) = Self::new();
        shutdown
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop is requested.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            // Sender gone without a stop: nothing will ever fire.
            std::future::pending::<()>().await;
        }
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left.
        self.tx.send_replace(true);
    }

    /// Trigger once `signal` resolves, e.g. `tokio::signal::ctrl_c()`.
    /// If the handler could not be installed the stop is never requested.
    pub async fn fire_on<F>(self, signal: F)
    where
        F: Future<Output = std::io::Result<()>>,
    {
        match signal.await {
            Ok(()) => {
                tracing::info!("stop signal received, finishing the current step");
                self.trigger();
            }
            Err(e) => {
                tracing::error!(error = %e, "could not listen for the stop signal; stop the process another way");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_is_visible_to_clones() {
        let (trigger, shutdown) = Shutdown::new();
        let mut waiter = shutdown.clone();
        assert!(!shutdown.is_requested());

        let task = tokio::spawn(async move { waiter.wait().await });
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("wait should resolve")
            .unwrap();
        assert!(shutdown.is_requested());
    }

    #[tokio::test]
    async fn never_does_not_resolve() {
        let mut s = Shutdown::never();
        assert!(!s.is_requested());
        let r = tokio::time::timeout(Duration::from_millis(30), s.wait()).await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn signal_triggers_the_stop() {
        let (trigger, shutdown) = Shutdown::new();
        trigger.fire_on(async { Ok(()) }).await;
        assert!(shutdown.is_requested());
    }

    #[tokio::test]
    async fn failed_signal_handler_does_not_stop() {
        let (trigger, shutdown) = Shutdown::new();
        let task = tokio::spawn(trigger.fire_on(async {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler"))
        }));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!shutdown.is_requested());
        assert!(!task.is_finished());
        task.abort();
    }
}
