use std::process::exit;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};

use threadgroup::{Counter, Result, SharedCounter, ThreadGroup, WorkerHandle};

const DEFAULT_SLEEP_MS: u64 = 2000;
const DEFAULT_WAIT_MS: u64 = 50;
const DEFAULT_RACE_TASKS: usize = 4;
const DEFAULT_RACE_ITERATIONS: u64 = 1;
const BUFFER_LEN: usize = 20;

#[derive(Parser)]
#[command(name = "threadgroup-demo", version, about = "Thread lifecycle demonstrations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the main thread id and the id of each worker
    Ids,
    /// Compare a counter moved in by value with one shared by reference
    PassByRef,
    /// Join one worker and detach another
    JoinDetach {
        /// How long each worker sleeps before printing
        #[arg(long, default_value_t = DEFAULT_SLEEP_MS, value_name = "MILLIS")]
        sleep_ms: u64,
    },
    /// Start a worker in a helper function and join it through the returned handle
    Ownership,
    /// Start one worker per CPU and join them all
    FanOut {
        /// Number of workers (defaults to the number of CPUs)
        #[arg(long, value_name = "N")]
        threads: Option<usize>,
    },
    /// Copy a stack buffer into an owned string before detaching the worker
    Dangling {
        /// How long to wait for the detached worker
        #[arg(long, default_value_t = DEFAULT_WAIT_MS, value_name = "MILLIS")]
        wait_ms: u64,
    },
    /// Race unsynchronized increments on a shared counter
    Race {
        /// Number of tasks
        #[arg(long, default_value_t = DEFAULT_RACE_TASKS, value_name = "N")]
        tasks: usize,
        /// Increments per task
        #[arg(long, default_value_t = DEFAULT_RACE_ITERATIONS, value_name = "N")]
        iterations: u64,
    },
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut group = ThreadGroup::new();
    let result = match cli.command {
        Commands::Ids => ids(&mut group),
        Commands::PassByRef => pass_by_ref(&mut group),
        Commands::JoinDetach { sleep_ms } => {
            join_detach(&mut group, Duration::from_millis(sleep_ms))
        }
        Commands::Ownership => ownership(&mut group),
        Commands::FanOut { threads } => {
            fan_out(&mut group, threads.unwrap_or_else(num_cpus::get))
        }
        Commands::Dangling { wait_ms } => dangling(&mut group, Duration::from_millis(wait_ms)),
        Commands::Race { tasks, iterations } => race(&mut group, tasks, iterations),
    };
    settle(group, result)
}

/// Ends the group after a subcommand. On error the remaining workers are
/// detached so the error reaches `main` instead of the leak panic.
fn settle(mut group: ThreadGroup, result: Result<()>) -> Result<()> {
    if result.is_err() {
        group.detach_all();
    }
    result.and_then(move |()| group.finish())
}

fn ids(group: &mut ThreadGroup) -> Result<()> {
    println!("Main thread ID: {:?}", thread::current().id());

    let mut handles = Vec::new();
    for name in ["Thread 1", "Thread 2"] {
        let handle = group.submit_with(name.to_owned(), |name| {
            println!("{} running on thread ID: {:?}", name, thread::current().id());
        })?;
        handles.push(handle);
    }
    for (n, handle) in handles.iter().enumerate() {
        println!("t{} worker ID: {}", n + 1, handle.id());
    }
    for handle in handles {
        group.join(handle)?;
    }
    Ok(())
}

fn pass_by_ref(group: &mut ThreadGroup) -> Result<()> {
    let by_value = Counter::default();
    let shared = SharedCounter::default();

    group.submit_with(by_value, |mut copy: Counter| copy.increment())?;
    let alias = shared.clone();
    group.submit(move || alias.increment())?;
    group.join_all()?;

    println!("shared counter: {}", shared.get());
    println!("by-value counter: {}", by_value.get());
    Ok(())
}

fn join_detach(group: &mut ThreadGroup, sleep: Duration) -> Result<()> {
    let joined = group.submit_with(1, move |idx: u32| {
        thread::sleep(sleep);
        println!("Hello, here is thread {}", idx);
    })?;
    let detached = group.submit_with(2, move |idx: u32| {
        thread::sleep(sleep);
        println!("Hello, here is thread {}", idx);
    })?;

    group.detach(detached)?;
    group.join(joined)
}

fn spawn_greeter(group: &mut ThreadGroup) -> Result<WorkerHandle> {
    group.submit(|| {
        thread::sleep(Duration::from_millis(500));
        println!("Hello from spawned thread!");
    })
}

fn ownership(group: &mut ThreadGroup) -> Result<()> {
    let handle = spawn_greeter(group)?;
    info!("Received handle for worker {}", handle.id());
    group.join(handle)
}

fn fan_out(group: &mut ThreadGroup, threads: usize) -> Result<()> {
    info!("Starting {} workers", threads);
    for _ in 0..threads {
        group.submit(|| {
            thread::sleep(Duration::from_millis(500));
            // One println per line keeps concurrent output from interleaving.
            let line = format!("Hello, my thread id is: {:?}", thread::current().id());
            println!("{}", line);
        })?;
    }
    let joined = group.join_all()?;
    info!("Joined {} workers", joined);
    Ok(())
}

fn dangling(group: &mut ThreadGroup, wait: Duration) -> Result<()> {
    let mut buffer = [0u8; BUFFER_LEN];
    buffer[..5].copy_from_slice(b"Hello");

    let len = buffer.iter().position(|&b| b == 0).unwrap_or(BUFFER_LEN);
    let message = String::from_utf8_lossy(&buffer[..len]).into_owned();
    group.submit_with(message, |msg| println!("Worker received: {}", msg))?;

    buffer.fill(b'#');
    group.detach_all();
    thread::sleep(wait);
    Ok(())
}

fn race(group: &mut ThreadGroup, tasks: usize, iterations: u64) -> Result<()> {
    let counter = SharedCounter::new(0);
    for _ in 0..tasks {
        let counter = counter.clone();
        group.submit(move || {
            for _ in 0..iterations {
                counter.increment();
            }
        })?;
    }
    group.join_all()?;

    let expected = tasks as u64 * iterations;
    let observed = counter.get();
    println!("expected: {}", expected);
    println!("observed: {}", observed);
    if observed < expected {
        info!("Lost {} update(s) to the race", expected - observed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use threadgroup::ThreadGroupError;

    use super::*;

    fn join_foreign(group: &mut ThreadGroup) -> Result<()> {
        group.submit(|| thread::sleep(Duration::from_millis(20)))?;
        let mut other = ThreadGroup::new();
        let foreign = other.submit(|| {})?;
        other.join_all()?;
        group.join(foreign)
    }

    #[test]
    fn failed_subcommand_returns_its_error() {
        let mut group = ThreadGroup::new();
        let result = join_foreign(&mut group);
        assert_eq!(group.outstanding_count(), 1);

        assert!(matches!(
            settle(group, result),
            Err(ThreadGroupError::UnknownWorker { .. })
        ));
    }

    #[test]
    fn successful_subcommand_checks_for_leaks() {
        let mut group = ThreadGroup::new();
        group.submit(|| {}).unwrap();
        assert!(matches!(
            settle(group, Ok(())),
            Err(ThreadGroupError::LeakedWorker { outstanding: 1 })
        ));

        let mut group = ThreadGroup::new();
        let result = pass_by_ref(&mut group);
        assert!(settle(group, result).is_ok());
    }
}
