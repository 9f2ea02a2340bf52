use std::process;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use heap::HeapSettings;

use vm::{Interpreter, RuntimeError, VMCreateInfo, demos};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Demo {
    /// (3 + 4) * 6
    Arith,
    /// Recursive SmallInteger>>fib
    Fib,
    /// Producer and consumer processes sharing a semaphore
    Processes,
    /// Allocation churn driving the collector
    Gc,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Program to run
    #[arg(long, value_enum, default_value = "arith")]
    demo: Demo,

    /// Input size for fib, processes and gc
    #[arg(long, default_value_t = 20)]
    n: i64,

    /// Words per heap segment
    #[arg(long)]
    segment_words: Option<usize>,

    /// Ceiling on ephemeral segments
    #[arg(long)]
    max_segments: Option<usize>,

    /// Ephemeral segments before the first collection
    #[arg(long)]
    gc_threshold: Option<usize>,

    /// Print heap and interpreter statistics after the run
    #[arg(long)]
    stats: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> VMCreateInfo {
        let defaults = HeapSettings::default();
        let heap = HeapSettings {
            segment_words: self.segment_words.unwrap_or(defaults.segment_words),
            max_ephemeral_segments: self.max_segments.unwrap_or(defaults.max_ephemeral_segments),
            gc_threshold_segments: self.gc_threshold.unwrap_or(defaults.gc_threshold_segments),
            ..defaults
        };
        VMCreateInfo {
            heap,
            ..VMCreateInfo::default()
        }
    }
}

fn run(cli: &Cli, vm: &mut Interpreter) -> Result<String, RuntimeError> {
    let result = match cli.demo {
        Demo::Arith => demos::arith(vm)?,
        Demo::Fib => demos::fib(vm, cli.n)?,
        Demo::Processes => demos::processes(vm, cli.n)?,
        Demo::Gc => demos::gc_churn(vm, cli.n)?,
    };
    Ok(match result.small_int() {
        Some(n) => n.to_string(),
        None => format!("{result:?}"),
    })
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut vm = match Interpreter::new(cli.settings()) {
        Ok(vm) => vm,
        Err(err) => {
            eprintln!("Error creating interpreter: {err}");
            process::exit(1);
        }
    };

    let start = Instant::now();
    match run(&cli, &mut vm) {
        Ok(result) => println!("{result}"),
        Err(err) => {
            eprintln!("Error running {:?}: {err}", cli.demo);
            process::exit(1);
        }
    }
    let elapsed = start.elapsed();

    if cli.stats {
        let stats = vm.heap().stats();
        let (hits, misses) = vm.method_cache_stats();
        println!("time:          {elapsed:?}");
        println!("instructions:  {}", vm.instructions());
        println!("switches:      {}", vm.context_switches());
        println!("cache:         {hits} hits, {misses} misses");
        println!("heap:          {stats:#?}");
    }
}
