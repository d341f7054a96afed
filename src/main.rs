//! Data loader: bulk-inserts pipe-delimited rows into a heap table.
//!
//! Reads a TPC-H `supplier` flat file (`suppkey|name|address|nationkey|
//! phone|acctbal|comment|`), builds typed tuples, and drives the full write
//! path: segment allocation, buffer pool, free space manager, table heap.
//! Progress lines carry the pool counters and the FSM bucket histogram so
//! the run can be sanity-checked (and parsed by tests) from stdout.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::ExitCode;
use std::sync::Arc;

use quarry::heap::TableHeap;
use quarry::record::{Column, ColumnType, Schema, Tuple, TupleBuilder};
use quarry::storage::{
    BufferPool, FreeSpaceManager, PageIo, ReplacerConfig, SegmentId, SegmentManager, SegmentProbe,
    StorageOptions,
};

struct Args {
    data_file: String,
    base_dir: String,
    page_size: usize,
    frames: usize,
    replacer: String,
    k: usize,
    log_every: usize,
    seg: SegmentId,
}

impl Default for Args {
    fn default() -> Self {
        let opts = StorageOptions::default();
        Self {
            data_file: String::new(),
            base_dir: "./dbdata".to_string(),
            page_size: opts.page_size,
            frames: opts.buffer_pool_frames,
            replacer: opts.replacer,
            k: 2,
            log_every: 1000,
            seg: 1,
        }
    }
}

fn usage(program: &str) {
    eprintln!(
        "Usage: {} <supplier.tbl> [--base_dir=./dbdata] [--frames=256] \
         [--page=8192] [--replacer=clock|lruk] [--k=2] [--log_every=1000] [--seg=1]",
        program
    );
}

fn parse_args() -> Result<Args, ()> {
    let mut argv = std::env::args();
    let program = argv.next().unwrap_or_else(|| "quarry".to_string());

    let mut args = Args::default();
    args.data_file = match argv.next() {
        Some(f) if !f.starts_with("--") => f,
        _ => {
            usage(&program);
            return Err(());
        }
    };

    for arg in argv {
        let Some((key, value)) = arg
            .strip_prefix("--")
            .and_then(|rest| rest.split_once('='))
        else {
            usage(&program);
            return Err(());
        };
        let ok = match key {
            "base_dir" => {
                args.base_dir = value.to_string();
                true
            }
            "replacer" => {
                args.replacer = value.to_string();
                true
            }
            "frames" => value.parse().map(|v| args.frames = v).is_ok(),
            "page" => value.parse().map(|v| args.page_size = v).is_ok(),
            "k" => value.parse().map(|v| args.k = v).is_ok(),
            "log_every" => value.parse().map(|v| args.log_every = v).is_ok(),
            "seg" => value.parse().map(|v| args.seg = v).is_ok(),
            _ => false,
        };
        if !ok {
            usage(&program);
            return Err(());
        }
    }
    Ok(args)
}

/// TPC-H supplier layout.
fn supplier_schema() -> Schema {
    Schema::new(
        vec![
            Column::new("suppkey", ColumnType::Int32, false),
            Column::new("name", ColumnType::Char(25), false),
            Column::new("address", ColumnType::VarChar(40), false),
            Column::new("nationkey", ColumnType::Int32, false),
            Column::new("phone", ColumnType::Char(15), false),
            Column::new("acctbal", ColumnType::Float64, false),
            Column::new("comment", ColumnType::VarChar(101), true),
        ],
        true,
    )
}

/// Splits a pipe-delimited line, tolerating CRLF and the trailing `|` of
/// TPC-H flat files.
fn split_pipe(raw: &str) -> Vec<&str> {
    let line = raw.strip_suffix('\r').unwrap_or(raw);
    let mut fields: Vec<&str> = line.split('|').collect();
    if fields.len() == 8 && fields.last() == Some(&"") {
        fields.pop();
    }
    fields
}

fn build_supplier_tuple(schema: &Schema, fields: &[&str]) -> Option<Tuple> {
    let mut tb = TupleBuilder::new(schema);
    tb.set_i32(0, fields[0].parse().ok()?).ok()?;
    tb.set_char(1, fields[1]).ok()?;
    tb.set_varchar(2, fields[2]).ok()?;
    tb.set_i32(3, fields[3].parse().ok()?).ok()?;
    tb.set_char(4, fields[4]).ok()?;
    tb.set_f64(5, fields[5].parse().ok()?).ok()?;
    tb.set_varchar(6, fields[6]).ok()?;
    tb.build().ok()
}

fn fsm_bins_line(fsm: &FreeSpaceManager) -> String {
    let bins: Vec<String> = fsm.bin_sizes().iter().map(|n| n.to_string()).collect();
    format!("FSM bins = [{}]", bins.join(", "))
}

fn main() -> ExitCode {
    env_logger::init();

    let Ok(args) = parse_args() else {
        return ExitCode::from(1);
    };

    if std::fs::create_dir_all(&args.base_dir).is_err() {
        eprintln!("Cannot create base dir: {}", args.base_dir);
        return ExitCode::from(2);
    }

    let segments = Arc::new(SegmentManager::new(args.page_size, &args.base_dir));
    if segments.ensure_segment(args.seg).is_err() {
        eprintln!("Segment initialization failed");
        return ExitCode::from(2);
    }
    let disk = match segments.disk(args.seg) {
        Ok(disk) => disk,
        Err(e) => {
            eprintln!("Segment initialization failed: {}", e);
            return ExitCode::from(2);
        }
    };

    let replacer = match ReplacerConfig::parse(&args.replacer) {
        Some(ReplacerConfig::Clock) => ReplacerConfig::Clock,
        Some(ReplacerConfig::LruK { .. }) => ReplacerConfig::LruK { k: args.k.max(2) },
        None => {
            log::warn!("unknown replacer {:?}, falling back to clock", args.replacer);
            ReplacerConfig::Clock
        }
    };

    let pool = Arc::new(BufferPool::new(
        disk.clone(),
        args.frames,
        replacer.build(args.frames),
    ));
    let fsm = Arc::new(FreeSpaceManager::new(vec![
        128, 512, 1024, 2048, 4096, 8192, 16384,
    ]));
    fsm.register_probe(Arc::clone(&segments) as Arc<dyn SegmentProbe>);

    let table = TableHeap::new(args.seg, Arc::clone(&pool), Arc::clone(&fsm), Arc::clone(&segments));
    let schema = supplier_schema();

    let file = match File::open(&args.data_file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Open data file failed: {}: {}", args.data_file, e);
            return ExitCode::from(3);
        }
    };

    println!(
        "[LOAD] begin: file={}, page_size={}, frames={}, replacer={}",
        args.data_file, args.page_size, args.frames, args.replacer
    );

    let mut rows: u64 = 0;
    let mut bad: u64 = 0;
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Read failed: {}", e);
                return ExitCode::from(3);
            }
        };
        if line.is_empty() {
            continue;
        }

        let fields = split_pipe(&line);
        if fields.len() != 7 {
            bad += 1;
            continue;
        }
        let Some(tuple) = build_supplier_tuple(&schema, &fields) else {
            bad += 1;
            continue;
        };
        if let Err(e) = table.insert(&tuple) {
            log::debug!("insert failed: {}", e);
            bad += 1;
            continue;
        }
        rows += 1;

        if args.log_every > 0 && rows % args.log_every as u64 == 0 {
            let stats = pool.stats();
            println!(
                "[PROGRESS] inserted={} hits={} misses={} evictions={} flushes={} pages={}",
                rows,
                stats.hits,
                stats.misses,
                stats.evictions,
                stats.flushes,
                segments.page_count(args.seg)
            );
            println!("{}", fsm_bins_line(&fsm));
        }
    }

    pool.flush_all();
    if let Err(e) = disk.sync() {
        log::warn!("sync failed: {}", e);
    }

    let stats = pool.stats();
    println!(
        "[LOAD] done: rows={} bad={} pages={} | stats: hits={}, misses={}, evictions={}, flushes={}",
        rows,
        bad,
        segments.page_count(args.seg),
        stats.hits,
        stats.misses,
        stats.evictions,
        stats.flushes
    );

    // Verify by scanning: preview a handful of rows, then count everything.
    let mut scanned: u64 = 0;
    let mut preview = 5;
    for (rid, tuple) in table.scan() {
        scanned += 1;
        if preview > 0 {
            preview -= 1;
            let suppkey = tuple.get_i32(&schema, 0).unwrap_or_default();
            let name = tuple.get_char(&schema, 1).unwrap_or_default();
            let nation = tuple.get_i32(&schema, 3).unwrap_or_default();
            let phone = tuple.get_char(&schema, 4).unwrap_or_default();
            let acctbal = tuple.get_f64(&schema, 5).unwrap_or_default();
            println!(
                "[ROW] RID=({},{}) suppkey={} name=\"{}\" nation={} phone=\"{}\" acctbal={}",
                rid.page_id, rid.slot, suppkey, name, nation, phone, acctbal
            );
        }
    }
    println!("[SCAN] total rows = {}", scanned);
    println!("{}", fsm_bins_line(&fsm));

    ExitCode::SUCCESS
}
