use std::{
    thread,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::{debug, error, info};
use threadpool::ThreadPool;


pub type FnTask = dyn Fn() -> Duration + Send + 'static;


fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}


/// A periodic job. The job returns how long to wait before its next run.
pub struct Task {
    name: &'static str,
    job: Arc<Mutex<FnTask>>,
    next_time: Instant,
    running: bool,
}

impl Task {
    pub fn new<F>(name: &'static str, job: F, first_delay: Duration) -> Self where
        F: Fn() -> Duration + Send + 'static {

        Task {
            name,
            job: Arc::new(Mutex::new(job)),
            next_time: Instant::now() + first_delay,
            running: false,
        }
    }

    /// Claims the job when it is due and idle.
    fn claim(&mut self, now: Instant) -> Option<Arc<Mutex<FnTask>>> {
        if self.running || now < self.next_time {
            return None;
        }

        self.running = true;
        Some(Arc::clone(&self.job))
    }

    fn reschedule(&mut self, delay: Duration) {
        self.next_time = Instant::now() + delay;
        self.running = false;
    }
}


pub struct TaskSchedulerBuilder {
    tasks: Vec<Arc<Mutex<Task>>>,
    n_workers: usize,
    period_resolution: Duration,
}

impl TaskSchedulerBuilder {
    pub fn new() -> Self {
        TaskSchedulerBuilder {
            tasks: Vec::new(),
            n_workers: 4,
            period_resolution: Duration::new(1, 0),
        }
    }

    pub fn n_workers(mut self, cnt: usize) -> Self {
        self.n_workers = cnt.max(1);
        self
    }

    pub fn period_resolution(mut self, period: Duration) -> Self {
        self.period_resolution = period;
        self
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(Arc::new(Mutex::new(task)));
    }

    pub fn build(self) -> TaskScheduler {
        TaskScheduler::new(self)
    }
}

impl Default for TaskSchedulerBuilder {
    fn default() -> Self {
        TaskSchedulerBuilder::new()
    }
}


pub struct TaskScheduler {
    scheduler: thread::JoinHandle<()>,
    running: Arc<Mutex<bool>>,
}

impl TaskScheduler {
    fn new(builder: TaskSchedulerBuilder) -> Self {
        let tasks = builder.tasks;
        let n_workers = builder.n_workers;
        let period_resolution = builder.period_resolution;

        let t_running = Arc::new(Mutex::new(true));
        let running = t_running.clone();

        info!("Starting scheduler with {} tasks", tasks.len());

        let scheduler_job = move || {
            let pool = ThreadPool::new(n_workers);

            while *lock(&running) {
                let now = Instant::now();

                for m_task in &tasks {
                    let claimed = {
                        let mut task = lock(m_task);
                        task.claim(now).map(|job| (task.name, job))
                    };

                    if let Some((name, job)) = claimed {
                        debug!("Run task {}", name);

                        let t_task = Arc::clone(m_task);
                        pool.execute(move || {
                            let delay = (*lock(&job))();
                            lock(&t_task).reschedule(delay);
                        });
                    }
                }

                thread::sleep(period_resolution);
            }

            pool.join();
        };

        TaskScheduler {
            scheduler: thread::spawn(scheduler_job),
            running: t_running,
        }
    }

    /// Stops dispatching and waits for running jobs.
    pub fn join(self) {
        {
            let mut running = lock(&self.running);

            if !*running {
                return;
            }

            *running = false;
        }

        if self.scheduler.join().is_err() {
            error!("Scheduler thread panicked");
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn tasks_rerun_after_the_returned_delay() {
        let hits = Arc::new(AtomicUsize::new(0));
        let t_hits = hits.clone();

        let mut builder = TaskSchedulerBuilder::new()
            .n_workers(1)
            .period_resolution(Duration::from_millis(5));
        builder.add_task(Task::new("count", move || {
            t_hits.fetch_add(1, Ordering::SeqCst);
            Duration::from_millis(5)
        }, Duration::from_millis(0)));

        let scheduler = builder.build();
        thread::sleep(Duration::from_millis(200));
        scheduler.join();

        assert!(hits.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn claimed_tasks_are_not_claimed_twice() {
        let mut task = Task::new("once", || Duration::from_secs(1), Duration::from_millis(0));
        let now = Instant::now();

        assert!(task.claim(now).is_some());
        assert!(task.claim(now).is_none());

        task.reschedule(Duration::from_millis(0));
        assert!(task.claim(Instant::now()).is_some());
    }

    #[test]
    fn delayed_tasks_wait_their_turn() {
        let hits = Arc::new(AtomicUsize::new(0));
        let t_hits = hits.clone();

        let mut builder = TaskSchedulerBuilder::new()
            .period_resolution(Duration::from_millis(5));
        builder.add_task(Task::new("late", move || {
            t_hits.fetch_add(1, Ordering::SeqCst);
            Duration::from_secs(60)
        }, Duration::from_secs(60)));

        let scheduler = builder.build();
        thread::sleep(Duration::from_millis(50));
        scheduler.join();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
