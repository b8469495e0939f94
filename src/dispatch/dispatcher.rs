//! Single-consumer task queue

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

/// A unit of work run once on the consumer, against the consumer's state
pub type DispatchTask<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Producer side of the queue; cheap to clone and safe to use from any thread
pub struct DispatchHandle<C> {
    queue_tx: mpsc::UnboundedSender<DispatchTask<C>>,
}

impl<C> Clone for DispatchHandle<C> {
    fn clone(&self) -> Self {
        Self {
            queue_tx: self.queue_tx.clone(),
        }
    }
}

impl<C: 'static> DispatchHandle<C> {
    /// Queue a task for the consumer
    ///
    /// Never blocks. Returns `false` if the dispatcher has been dropped,
    /// in which case the task is discarded.
    pub fn enqueue<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.queue_tx.send(Box::new(task)).is_ok()
    }

    /// True once the owning dispatcher is gone
    pub fn is_closed(&self) -> bool {
        self.queue_tx.is_closed()
    }
}

/// Consumer side of the queue, owned by whoever owns the consumer state
pub struct Dispatcher<C> {
    queue_tx: mpsc::UnboundedSender<DispatchTask<C>>,
    queue_rx: mpsc::UnboundedReceiver<DispatchTask<C>>,
    /// Total tasks executed over the dispatcher's lifetime
    executed: u64,
}

impl<C: 'static> Dispatcher<C> {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            queue_tx,
            queue_rx,
            executed: 0,
        }
    }

    /// Get a producer handle for a background task
    pub fn handle(&self) -> DispatchHandle<C> {
        DispatchHandle {
            queue_tx: self.queue_tx.clone(),
        }
    }

    /// Run every queued task in enqueue order
    ///
    /// Keeps popping until the queue is empty, so tasks enqueued by other
    /// threads while draining run in this same pass. Tasks must not block.
    pub fn drain_all(&mut self, ctx: &mut C) -> usize {
        let mut ran = 0;

        loop {
            match self.queue_rx.try_recv() {
                Ok(task) => {
                    task(ctx);
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if ran > 0 {
            self.executed += ran as u64;
            debug!("[DISPATCH] Drained {} task(s)", ran);
        }

        ran
    }

    /// Total tasks executed so far
    pub fn executed(&self) -> u64 {
        self.executed
    }
}

impl<C: 'static> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drain_empty() {
        let mut dispatcher: Dispatcher<Vec<u32>> = Dispatcher::new();
        let mut log = Vec::new();
        assert_eq!(dispatcher.drain_all(&mut log), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_tasks_wait_for_drain() {
        let mut dispatcher: Dispatcher<Vec<u32>> = Dispatcher::new();
        let handle = dispatcher.handle();
        let mut log = Vec::new();

        assert!(handle.enqueue(|log: &mut Vec<u32>| log.push(1)));
        assert!(log.is_empty(), "nothing runs before drain");

        assert_eq!(dispatcher.drain_all(&mut log), 1);
        assert_eq!(log, vec![1]);
    }

    #[test]
    fn test_fifo_and_exactly_once() {
        let mut dispatcher: Dispatcher<Vec<u32>> = Dispatcher::new();
        let handle = dispatcher.handle();
        let mut log = Vec::new();

        for i in 0..100 {
            handle.enqueue(move |log: &mut Vec<u32>| log.push(i));
        }

        assert_eq!(dispatcher.drain_all(&mut log), 100);
        assert_eq!(log, (0..100).collect::<Vec<_>>());

        // Second drain has nothing left to run
        assert_eq!(dispatcher.drain_all(&mut log), 0);
        assert_eq!(log.len(), 100);
        assert_eq!(dispatcher.executed(), 100);
    }

    #[test]
    fn test_enqueue_from_threads() {
        let mut dispatcher: Dispatcher<Vec<(u32, u32)>> = Dispatcher::new();
        let mut log = Vec::new();

        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let handle = dispatcher.handle();
                thread::spawn(move || {
                    for seq in 0..250 {
                        handle.enqueue(move |log: &mut Vec<(u32, u32)>| log.push((producer, seq)));
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(dispatcher.drain_all(&mut log), 1000);

        // Each producer's tasks run in the order it enqueued them
        for producer in 0..4 {
            let seqs: Vec<u32> = log
                .iter()
                .filter(|(p, _)| *p == producer)
                .map(|(_, s)| *s)
                .collect();
            assert_eq!(seqs, (0..250).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_tasks_enqueued_mid_drain_run_same_pass() {
        use std::sync::mpsc as std_mpsc;

        let mut dispatcher: Dispatcher<Vec<u32>> = Dispatcher::new();
        let handle = dispatcher.handle();
        let (go_tx, go_rx) = std_mpsc::channel::<()>();
        let (done_tx, done_rx) = std_mpsc::channel::<()>();

        // Producer waits until the drain is inside the first task
        let producer_handle = dispatcher.handle();
        let producer = thread::spawn(move || {
            go_rx.recv().unwrap();
            for i in 1..=5 {
                producer_handle.enqueue(move |log: &mut Vec<u32>| log.push(i));
            }
            done_tx.send(()).unwrap();
        });

        handle.enqueue(move |log: &mut Vec<u32>| {
            go_tx.send(()).unwrap();
            done_rx.recv().unwrap();
            log.push(0);
        });

        let mut log = Vec::new();
        assert_eq!(dispatcher.drain_all(&mut log), 6);
        assert_eq!(log, vec![0, 1, 2, 3, 4, 5]);

        producer.join().unwrap();
        assert_eq!(dispatcher.drain_all(&mut log), 0);
    }

    #[test]
    fn test_handle_outlives_dispatcher() {
        let dispatcher: Dispatcher<Vec<u32>> = Dispatcher::new();
        let handle = dispatcher.handle();
        drop(dispatcher);

        assert!(handle.is_closed());
        assert!(!handle.enqueue(|log: &mut Vec<u32>| log.push(1)));
    }
}
