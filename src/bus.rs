use std::sync::Arc;
use tokio::sync::broadcast;

use strafe_kinematics::Pose;

/// One published pose estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub timestamp_s: f64,
    pub pose: Pose,
    pub stale: bool,
}

/// Fan-out topic over a bounded broadcast channel.
///
/// Slow subscribers lose the oldest messages rather than blocking the
/// publisher, which is the control loop.
#[derive(Debug, Clone)]
pub struct Topic<T> {
    tx: broadcast::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> Topic<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish `msg`; returns how many subscribers will see it.
    pub fn publish(&self, msg: T) -> usize {
        self.tx.send(Arc::new(msg)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let topic: Topic<PoseSample> = Topic::new(4);
        let sample = PoseSample { timestamp_s: 0.0, pose: Pose::default(), stale: false };
        assert_eq!(topic.publish(sample), 0);

        let mut rx = topic.subscribe();
        assert_eq!(topic.publish(sample), 1);
        assert_eq!(*rx.try_recv().unwrap(), sample);
    }
}
