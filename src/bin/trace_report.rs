use std::path::PathBuf;
use std::process;

use w65_tracer::debug_flags;
use w65_tracer::snapshot;
use w65_tracer::{TraceGraph, VectorId};

// Summarises a trace snapshot.
//   cargo run --release --bin trace_report -- trace.db --listing --bank 0x80
// The database defaults to TRACE_DB (or trace.db).

fn parse_u32_hex_or_dec(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(stripped) = s.strip_prefix("0x").or_else(|| s.strip_prefix('$')) {
        u32::from_str_radix(stripped, 16).ok()
    } else {
        s.parse().ok()
    }
}

struct Options {
    db: PathBuf,
    listing: bool,
    bank: Option<u8>,
}

fn parse_args() -> Result<Options, String> {
    let mut args = std::env::args().skip(1);
    let mut db: Option<PathBuf> = None;
    let mut listing = false;
    let mut bank: Option<u8> = None;

    while let Some(a) = args.next() {
        match a.as_str() {
            "--listing" | "-l" => listing = true,
            "--bank" => {
                let v = args.next().ok_or("--bank needs a value")?;
                let n = parse_u32_hex_or_dec(&v)
                    .filter(|&n| n <= 0xFF)
                    .ok_or_else(|| format!("invalid bank: {}", v))?;
                bank = Some(n as u8);
            }
            "--help" | "-h" => {
                return Err("Usage: trace_report [<db>] [--listing] [--bank N]".to_string())
            }
            _ => {
                if db.is_none() {
                    db = Some(PathBuf::from(&a));
                } else {
                    return Err(format!("unexpected argument: {}", a));
                }
            }
        }
    }

    Ok(Options {
        db: db.unwrap_or_else(debug_flags::snapshot_path),
        listing,
        bank,
    })
}

fn print_summary(graph: &TraceGraph) {
    println!(
        "instructions={} references={} subroutines={} non-standard returns={}",
        graph.instructions.len(),
        graph.references.len(),
        graph.subroutines.len(),
        graph.nonstandard_returns().count()
    );

    for id in [VectorId::Reset, VectorId::Nmi, VectorId::Irq] {
        match graph.vector(id) {
            Some(pc) => println!("{:<5} ${:06X}", id, pc),
            None => println!("{:<5} (not seen)", id),
        }
    }
}

fn print_subroutines(graph: &TraceGraph, bank: Option<u8>) {
    println!("Subroutines:");
    for &addr in &graph.subroutines {
        if bank.map_or(true, |b| (addr >> 16) as u8 == b) {
            println!("  ${:06X}", addr);
        }
    }

    let mut nonstandard = graph.nonstandard_returns().peekable();
    if nonstandard.peek().is_some() {
        println!("Non-standard returns:");
        for r in nonstandard {
            println!("  ${:06X} -> ${:06X}", r.origin, r.target);
        }
    }
}

fn print_listing(graph: &TraceGraph, bank: Option<u8>) {
    println!("Listing:");
    for row in &graph.instructions {
        if bank.is_some_and(|b| (row.address >> 16) as u8 != b) {
            continue;
        }
        if graph.subroutines.binary_search(&row.address).is_ok() {
            println!("sub_{:06X}:", row.address);
        }
        let targets: Vec<String> = graph
            .references_from(row.address)
            .iter()
            .map(|r| format!("${:06X} ({})", r.target, r.kind))
            .collect();
        if targets.is_empty() {
            println!("  {:06X}  {}", row.address, row);
        } else {
            println!("  {:06X}  {:<20} ; {}", row.address, row.to_string(), targets.join(", "));
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(2);
        }
    };

    let graph = match snapshot::load_from_path(&opts.db) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("failed to read {}: {}", opts.db.display(), e);
            process::exit(1);
        }
    };

    if !debug_flags::quiet() {
        println!("Snapshot: {}", opts.db.display());
    }
    print_summary(&graph);
    print_subroutines(&graph, opts.bank);
    if opts.listing {
        print_listing(&graph, opts.bank);
    }
}
