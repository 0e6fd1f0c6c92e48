use std::sync::Arc;

use tokio::sync::watch;

/// Counts in-flight single-node runs; a full run waits for it to reach zero.
#[derive(Clone)]
pub struct ZeroGate {
    count: Arc<watch::Sender<usize>>,
}

/// Held for the duration of one counted operation.
pub struct GateGuard {
    count: Arc<watch::Sender<usize>>,
}

impl ZeroGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    pub fn enter(&self) -> GateGuard {
        self.count.send_modify(|c| *c += 1);
        GateGuard {
            count: self.count.clone(),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolves once no guard is held.
    pub async fn wait_zero(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}

impl Default for ZeroGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.count.send_modify(|c| *c -= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_zero_returns_immediately_when_idle() {
        let gate = ZeroGate::new();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_zero())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_zero_wakes_when_last_guard_drops() {
        let gate = ZeroGate::new();
        let first = gate.enter();
        let second = gate.enter();
        assert_eq!(gate.count(), 2);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_zero().await })
        };

        drop(first);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gate.count(), 0);
    }
}
