use clap::Parser as ClapParser;
use meltgc_runtime::{GcConfig, Runtime, Slot, SpecialDescriptor, SpecialKind};
use tracing_subscriber::EnvFilter;

fn main() {
    let opt = Opt::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match build_config(&opt) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };
    tracing::info!(?config, "starting workload");

    let mut rt = match Runtime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };
    let ticket = rt.register_special_kind(
        SpecialDescriptor::new("TICKET").with_format(|payload| match payload.downcast_ref::<u64>() {
            Some(n) => format!("#{}", n),
            None => "#?".to_owned(),
        }),
    );

    let (kept, entries) = run_workload(&mut rt, &opt, ticket);
    if opt.final_major {
        rt.full_collect();
    }

    println!("{}", rt.stats());
    println!("kept values: {}", kept);
    println!("map entries: {}", entries);
    println!(
        "old space: {} objects, {} bytes",
        rt.old_live_objects(),
        rt.old_live_bytes()
    );
    println!("live specials: {}", rt.live_specials());
}

fn build_config(opt: &Opt) -> Result<GcConfig, meltgc_runtime::ConfigError> {
    let mut config = GcConfig::parse_options(opt.options.as_deref().unwrap_or(""))?;
    if let Some(kw) = opt.minor_zone {
        config = config.with_minor_size_kw(kw);
    }
    if let Some(kw) = opt.full_threshold {
        config = config.with_full_threshold_kw(kw);
    }
    if let Some(period) = opt.full_period {
        config = config.with_full_period(period);
    }
    if let Some(kw) = opt.copied_threshold {
        config = config.with_copied_threshold_kw(kw);
    }
    config.validate()?;
    Ok(config)
}

/// Allocate a stream of short-lived values, keeping every `keep_every`-th one
/// in a list and a string map, and retiring old entries so that old space
/// sees deaths too. Returns the final list length and map size.
fn run_workload(rt: &mut Runtime, opt: &Opt, ticket: SpecialKind) -> (usize, usize) {
    let keep_every = opt.keep_every.max(1);
    let mut f = rt.enter_frame("workload", 4);
    let list = f.make_list();
    f.set_var(0, list);
    let map = f.make_map_strings(16);
    f.set_var(1, map);
    let log = f.make_strbuf();
    f.set_var(2, log);

    for i in 0..opt.iterations {
        let n = f.make_int(i as i64);
        f.set_var(3, n);
        let garbage = f.make_pair(n, Slot::None);
        let n = f.value(3);
        f.set_pair_tail(garbage, n);
        if i % keep_every != 0 {
            continue;
        }

        let kept = if i % (keep_every * 64) == 0 {
            f.make_special(ticket, Box::new(i as u64))
        } else {
            f.make_mixint(n, i as i64)
        };
        f.set_var(3, kept);
        let list = f.value(0);
        f.list_append(list, kept);
        let (map, kept) = (f.value(1), f.value(3));
        f.map_strings_put(map, &format!("k{}", i), kept);

        // Retire the oldest entries once the window is full.
        let window = keep_every * opt.window;
        if i >= window {
            let list = f.value(0);
            f.list_pop_front(list);
            let map = f.value(1);
            f.map_strings_remove(map, &format!("k{}", i - window));
        }

        if i % (keep_every * 1024) == 0 {
            let log = f.value(2);
            f.strbuf_clear(log);
            f.strbuf_add(log, &format!("checkpoint {}", i));
            tracing::debug!(
                iteration = i,
                minor = f.stats().minor_collections,
                major = f.stats().major_collections,
                "checkpoint"
            );
        }
    }

    let (list, map) = (f.value(0), f.value(1));
    let kept = list.list_len().unwrap_or(0);
    let entries = f.map_count(map).unwrap_or(0);
    tracing::info!(
        kept,
        entries,
        last_checkpoint = ?f.value(2).strbuf_contents(),
        "workload done"
    );
    (kept, entries)
}

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Opt {
    /// Size of the young arena, in kilowords.
    #[clap(long)]
    minor_zone: Option<usize>,

    /// Young allocation volume between full collections, in kilowords.
    #[clap(long)]
    full_threshold: Option<usize>,

    /// Number of minor collections between periodic full collections.
    /// Zero disables periodic full collections.
    #[clap(long)]
    full_period: Option<u32>,

    /// Volume copied to old space between full collections, in kilowords.
    #[clap(long)]
    copied_threshold: Option<usize>,

    /// Collector options as `key=value` pairs, e.g. `minor-zone=256,full-period=8`.
    /// The dedicated flags take precedence.
    #[clap(short, long)]
    options: Option<String>,

    /// Number of values to allocate.
    #[clap(short = 'n', long, default_value = "100000")]
    iterations: usize,

    /// Keep one value out of this many.
    #[clap(short, long, default_value = "16")]
    keep_every: usize,

    /// Number of kept values alive at once.
    #[clap(short, long, default_value = "512")]
    window: usize,

    /// Run a full collection before printing statistics.
    #[clap(long)]
    final_major: bool,
}
