//! Bounded FIFO task queue with reserved room for stop signals.

use super::{Message, QueueError, QueueResult};
use crate::core::{Context, Task};
use crossbeam_channel::{self as channel, Receiver, Sender, TrySendError};

/// A bounded FIFO queue of [`Message`]s.
///
/// At most `capacity` [`Message::Run`] entries can be queued at once. Admission
/// is controlled by a second bounded channel of permits: a producer must place a
/// permit before its task goes onto the message channel, and a consumer takes one
/// back out when it dequeues a task. The message channel itself is sized
/// `capacity + reserved`, so up to `reserved` [`Message::Stop`] entries always fit,
/// even while the queue is saturated with real work.
///
/// # Example
///
/// ```rust
/// use fanout::queue::{BoundedQueue, Message, QueueError};
/// use fanout::{work, Context, Task};
///
/// let queue = BoundedQueue::new(1, 1);
/// let ctx = Context::background();
///
/// queue.try_push(Task::new(work(|_| {}), &ctx)).unwrap();
/// assert!(matches!(
///     queue.try_push(Task::new(work(|_| {}), &ctx)),
///     Err(QueueError::Full(_))
/// ));
///
/// // A stop signal still fits
/// queue.push_stop();
/// assert!(matches!(queue.pop(), Some(Message::Run(_))));
/// assert!(matches!(queue.pop(), Some(Message::Stop)));
/// ```
pub struct BoundedQueue {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    permits: Sender<()>,
    released: Receiver<()>,
    capacity: usize,
}

impl BoundedQueue {
    /// Creates a queue holding `capacity` tasks plus `reserved` stop signals.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, reserved: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        let (sender, receiver) = channel::bounded(capacity + reserved);
        let (permits, released) = channel::bounded(capacity);
        Self {
            sender,
            receiver,
            permits,
            released,
            capacity,
        }
    }

    /// Returns the maximum number of queued tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks currently queued.
    ///
    /// Stop signals are not counted. A producer that holds a slot but has not
    /// finished enqueuing is counted.
    pub fn len(&self) -> usize {
        self.released.len()
    }

    /// True if no task is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue without waiting; fails with [`QueueError::Full`] when saturated.
    pub fn try_push(&self, task: Task) -> QueueResult<()> {
        match self.permits.try_send(()) {
            Ok(()) => self.enqueue(task),
            Err(TrySendError::Full(())) => Err(QueueError::Full(task)),
            Err(TrySendError::Disconnected(())) => Err(QueueError::Disconnected(task)),
        }
    }

    /// Enqueue, waiting for a free slot.
    ///
    /// The wait ends early when `ctx` is cancelled or reaches its deadline
    /// ([`QueueError::Abandoned`]) or when `interrupt` becomes ready
    /// ([`QueueError::Interrupted`]). No other timeout applies.
    pub fn push_wait(&self, task: Task, ctx: &Context, interrupt: &Receiver<()>) -> QueueResult<()> {
        enum Wait {
            Slot(bool),
            Abandoned,
            Interrupted,
        }

        let done = ctx.done();
        let timer = ctx.deadline_timer();
        let wait = channel::select! {
            send(self.permits, ()) -> res => Wait::Slot(res.is_ok()),
            recv(done) -> _ => Wait::Abandoned,
            recv(timer) -> _ => Wait::Abandoned,
            recv(interrupt) -> _ => Wait::Interrupted,
        };

        match wait {
            Wait::Slot(true) => self.enqueue(task),
            Wait::Slot(false) => Err(QueueError::Disconnected(task)),
            Wait::Abandoned => Err(QueueError::Abandoned(task)),
            Wait::Interrupted => Err(QueueError::Interrupted(task)),
        }
    }

    /// Enqueue a stop signal, bypassing the task capacity.
    ///
    /// Room is reserved for `reserved` signals; pushing more than that may block
    /// until consumers make space.
    pub fn push_stop(&self) {
        // Cannot disconnect: self holds the receiver
        let _ = self.sender.send(Message::Stop);
    }

    /// Dequeue the next message, blocking while the queue is empty.
    pub fn pop(&self) -> Option<Message> {
        let message = self.receiver.recv().ok()?;
        if let Message::Run(_) = message {
            // Give the slot back to producers
            let _ = self.released.try_recv();
        }
        Some(message)
    }

    fn enqueue(&self, task: Task) -> QueueResult<()> {
        // A permit is held, so the message channel has room
        self.sender.send(Message::Run(task)).map_err(|e| match e.0 {
            Message::Run(task) => QueueError::Disconnected(task),
            Message::Stop => unreachable!("enqueue only sends Run"),
        })
    }
}

impl std::fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{work, CancellationToken};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn create_test_task() -> Task {
        Task::new(work(|_| {}), &Context::background())
    }

    fn run(message: Message) {
        match message {
            Message::Run(task) => {
                let (work, ctx) = task.into_parts();
                work(ctx);
            }
            Message::Stop => panic!("expected a task"),
        }
    }

    #[test]
    fn test_capacity() {
        let queue = BoundedQueue::new(5, 1);
        assert_eq!(queue.capacity(), 5);
        assert!(queue.is_empty());
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _ = BoundedQueue::new(0, 1);
    }

    #[test]
    fn test_try_push_full_returns_task() {
        let queue = BoundedQueue::new(2, 0);
        queue.try_push(create_test_task()).unwrap();
        queue.try_push(create_test_task()).unwrap();

        match queue.try_push(create_test_task()) {
            Err(QueueError::Full(task)) => {
                // Task is recoverable and still runnable
                let (work, ctx) = task.into_parts();
                work(ctx);
            }
            other => panic!("expected Full error, got {:?}", other.err()),
        }
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(8, 0);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = Arc::clone(&seen);
            queue
                .try_push(Task::new(
                    work(move |_| seen.lock().push(i)),
                    &Context::background(),
                ))
                .unwrap();
        }
        for _ in 0..5 {
            run(queue.pop().unwrap());
        }
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_pop_releases_slot() {
        let queue = BoundedQueue::new(1, 0);
        queue.try_push(create_test_task()).unwrap();
        assert_eq!(queue.len(), 1);

        run(queue.pop().unwrap());
        assert_eq!(queue.len(), 0);
        queue.try_push(create_test_task()).unwrap();
    }

    #[test]
    fn test_stop_bypasses_capacity() {
        let queue = BoundedQueue::new(1, 2);
        queue.try_push(create_test_task()).unwrap();
        queue.push_stop();
        queue.push_stop();

        // Stops are not tasks
        assert_eq!(queue.len(), 1);
        assert!(matches!(queue.pop(), Some(Message::Run(_))));
        assert!(matches!(queue.pop(), Some(Message::Stop)));
        assert!(matches!(queue.pop(), Some(Message::Stop)));
    }

    #[test]
    fn test_push_wait_blocks_until_slot_frees() {
        let queue = Arc::new(BoundedQueue::new(1, 0));
        queue.try_push(create_test_task()).unwrap();

        let q = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            let interrupt = crossbeam_channel::never();
            q.push_wait(create_test_task(), &Context::background(), &interrupt)
                .is_ok()
        });

        thread::sleep(Duration::from_millis(20));
        run(queue.pop().unwrap());

        assert!(handle.join().unwrap());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_push_wait_abandoned_by_deadline() {
        let queue = BoundedQueue::new(1, 0);
        queue.try_push(create_test_task()).unwrap();

        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let interrupt = crossbeam_channel::never();
        match queue.push_wait(create_test_task(), &ctx, &interrupt) {
            Err(QueueError::Abandoned(_)) => {}
            other => panic!("expected Abandoned, got {:?}", other.err()),
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_push_wait_interrupted() {
        let queue = Arc::new(BoundedQueue::new(1, 0));
        queue.try_push(create_test_task()).unwrap();

        let token = CancellationToken::new();
        let interrupt = token.done().clone();
        let q = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            matches!(
                q.push_wait(create_test_task(), &Context::background(), &interrupt),
                Err(QueueError::Interrupted(_))
            )
        });

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_concurrent_producers_consumer() {
        let queue = Arc::new(BoundedQueue::new(4, 1));
        let executed = Arc::new(AtomicUsize::new(0));
        let producers = 4;
        let per_producer = 25;

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                while let Some(Message::Run(task)) = queue.pop() {
                    let (work, ctx) = task.into_parts();
                    work(ctx);
                }
            })
        };

        let handles: Vec<_> = (0..producers)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let executed = Arc::clone(&executed);
                thread::spawn(move || {
                    let interrupt = crossbeam_channel::never();
                    for _ in 0..per_producer {
                        let executed = Arc::clone(&executed);
                        let task = Task::new(
                            work(move |_| {
                                executed.fetch_add(1, Ordering::SeqCst);
                            }),
                            &Context::background(),
                        );
                        queue
                            .push_wait(task, &Context::background(), &interrupt)
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        queue.push_stop();
        consumer.join().unwrap();
        assert_eq!(executed.load(Ordering::SeqCst), producers * per_producer);
    }
}
