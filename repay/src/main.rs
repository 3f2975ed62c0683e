extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate ledger_amount;
extern crate ledger_core;
extern crate serde_json;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{App, Arg, ArgMatches, SubCommand};

use ledger_amount::Amount;
use ledger_core::config::EngineConfig;
use ledger_core::ledger::LedgerStore;
use ledger_core::node::NodeId;
use ledger_core::{AdminCapability, Engine};

fn main() {
    let matches = build_cli().get_matches();

    let log_level = match matches.occurrences_of("v") {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter(None, log_level).init();

    let ledger_path = matches.value_of("LEDGER").unwrap();
    let config = config_from_matches(&matches);

    let store = load_store(ledger_path);
    let engine = Engine::from_store(store, config);

    let exit_code = run_subcommand(&engine, &matches);

    save_store(ledger_path, &engine);
    process::exit(exit_code);
}

/// Build the engine tunables from `clap` flags, overriding only the ones
/// the operator supplied.
fn config_from_matches(matches: &ArgMatches) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(v) = matches.value_of("cost-scale-factor") {
        config.cost_scale_factor = v.parse().unwrap_or_else(|_| {
            error!("invalid --cost-scale-factor: {}", v);
            process::exit(2);
        });
    }
    if let Some(v) = matches.value_of("max-retries") {
        config.max_limit_collision_retries = v.parse().unwrap_or_else(|_| {
            error!("invalid --max-retries: {}", v);
            process::exit(2);
        });
    }
    config
}

fn build_cli() -> App<'static, 'static> {
    App::new("repay")
        .version("1.0")
        .about("Mutual-credit ledger and ripple-payment router")
        .arg(Arg::with_name("LEDGER").required(true).help("Path to the ledger's JSON state file"))
        .arg(Arg::with_name("v").short("v").multiple(true).help("Increase the level of verbosity"))
        .arg(Arg::with_name("cost-scale-factor").long("cost-scale-factor").takes_value(true))
        .arg(Arg::with_name("max-retries").long("max-retries").takes_value(true))
        .subcommand(SubCommand::with_name("create-node").about("Allocate a new node"))
        .subcommand(
            SubCommand::with_name("delete-node")
                .about("Remove a node and all its creditlines")
                .arg(Arg::with_name("NODE").required(true)),
        )
        .subcommand(
            SubCommand::with_name("limit")
                .about("Set endorser -> recipient credit limit")
                .arg(Arg::with_name("ENDORSER").required(true))
                .arg(Arg::with_name("RECIPIENT").required(true))
                .arg(Arg::with_name("WEIGHT").required(true)),
        )
        .subcommand(
            SubCommand::with_name("attempt")
                .about("Attempt a payment, routed or direct")
                .arg(Arg::with_name("PAYER").required(true))
                .arg(Arg::with_name("RECIPIENT").required(true))
                .arg(Arg::with_name("AMOUNT").required(true))
                .arg(Arg::with_name("memo").long("memo").takes_value(true))
                .arg(Arg::with_name("direct").long("direct").help(
                    "Bypass routing and per-edge limits (administrative use only)",
                )),
        )
        .subcommand(SubCommand::with_name("audit").about("Run ledger and payment consistency checks"))
        .subcommand(
            SubCommand::with_name("rebuild-graph-cache").about("Rebuild both cached flow graphs from scratch"),
        )
        .subcommand(
            SubCommand::with_name("verify-cached-graph")
                .about("Compare the live-built graph against the cache"),
        )
        .subcommand(
            SubCommand::with_name("reputation")
                .about("Max-flow from target to asker with balances zeroed")
                .arg(Arg::with_name("TARGET").required(true))
                .arg(Arg::with_name("ASKER").required(true)),
        )
        .subcommand(
            SubCommand::with_name("max-payment")
                .about("Max-flow from payer to recipient under current balances")
                .arg(Arg::with_name("PAYER").required(true))
                .arg(Arg::with_name("RECIPIENT").required(true)),
        )
        .subcommand(
            SubCommand::with_name("account")
                .about("Print a's view of its account with b")
                .arg(Arg::with_name("A").required(true))
                .arg(Arg::with_name("B").required(true)),
        )
        .subcommand(
            SubCommand::with_name("entries")
                .about("List entries on the account between a and b, newest first")
                .arg(Arg::with_name("A").required(true))
                .arg(Arg::with_name("B").required(true)),
        )
}

fn run_subcommand(engine: &Engine, matches: &ArgMatches) -> i32 {
    match matches.subcommand() {
        ("create-node", Some(_)) => {
            let id = engine.create_node();
            println!("{}", id.0);
            0
        }
        ("delete-node", Some(sub)) => {
            engine.delete_node(node_arg(sub, "NODE"));
            0
        }
        ("limit", Some(sub)) => {
            let endorser = node_arg(sub, "ENDORSER");
            let recipient = node_arg(sub, "RECIPIENT");
            let weight = amount_arg(sub, "WEIGHT");
            match engine.set_credit_limit(endorser, recipient, weight) {
                Ok(()) => 0,
                Err(e) => {
                    error!("limit failed: {}", e);
                    1
                }
            }
        }
        ("attempt", Some(sub)) => cmd_attempt(engine, sub),
        ("audit", Some(_)) => cmd_audit(engine),
        ("rebuild-graph-cache", Some(_)) => {
            engine.rebuild_graph_cache();
            0
        }
        ("verify-cached-graph", Some(_)) => {
            let (payment_ok, reputation_ok) = engine.verify_cached_graph();
            if payment_ok && reputation_ok {
                0
            } else {
                1
            }
        }
        ("reputation", Some(sub)) => {
            let target = node_arg(sub, "TARGET");
            let asker = node_arg(sub, "ASKER");
            println!("{}", engine.reputation(target, asker));
            0
        }
        ("max-payment", Some(sub)) => {
            let payer = node_arg(sub, "PAYER");
            let recipient = node_arg(sub, "RECIPIENT");
            println!("{}", engine.max_payment(payer, recipient));
            0
        }
        ("account", Some(sub)) => cmd_account(engine, sub),
        ("entries", Some(sub)) => cmd_entries(engine, sub),
        _ => {
            eprintln!("no subcommand given; see `repay --help`");
            2
        }
    }
}

fn cmd_attempt(engine: &Engine, sub: &ArgMatches) -> i32 {
    let payer = node_arg(sub, "PAYER");
    let recipient = node_arg(sub, "RECIPIENT");
    let amount = amount_arg(sub, "AMOUNT");
    let memo = sub.value_of("memo").unwrap_or("").to_string();
    let now = unix_now();

    let result = if sub.is_present("direct") {
        let cap = AdminCapability::acquire();
        engine.commit_as_direct_entry(cap, payer, recipient, amount, memo, now)
    } else {
        engine.attempt_payment(payer, recipient, amount, memo, now)
    };

    match result {
        Ok(payment_id) => {
            info!("payment {:?} completed", payment_id);
            println!("{{\"status\":\"completed\",\"payment_id\":{}}}", payment_id.0);
            0
        }
        Err(e) => {
            warn!("payment failed: {}", e);
            println!("{{\"status\":\"failed\",\"reason\":\"{}\"}}", e);
            1
        }
    }
}

fn cmd_audit(engine: &Engine) -> i32 {
    let ledger_violations = engine.audit_ledger();
    let payment_violations = engine.audit_payments();
    for v in &ledger_violations {
        println!("{}", v);
    }
    for v in &payment_violations {
        println!("{}", v);
    }
    if ledger_violations.is_empty() && payment_violations.is_empty() {
        0
    } else {
        1
    }
}

fn cmd_account(engine: &Engine, sub: &ArgMatches) -> i32 {
    let a = node_arg(sub, "A");
    let b = node_arg(sub, "B");
    match engine.get_account(a, b) {
        Some(view) => {
            println!(
                "{{\"balance\":\"{}\",\"out_limit\":\"{}\",\"in_limit\":\"{}\"}}",
                view.balance, view.out_limit, view.in_limit
            );
            0
        }
        None => {
            println!("null");
            1
        }
    }
}

fn cmd_entries(engine: &Engine, sub: &ArgMatches) -> i32 {
    let a = node_arg(sub, "A");
    let b = node_arg(sub, "B");
    for entry in engine.iter_entries_of(a, b) {
        println!(
            "{{\"amount\":\"{}\",\"new_balance\":\"{}\",\"date\":{}}}",
            entry.amount, entry.new_balance, entry.date
        );
    }
    0
}

fn node_arg(matches: &ArgMatches, name: &str) -> NodeId {
    let raw = matches.value_of(name).unwrap();
    let id: u64 = raw.parse().unwrap_or_else(|_| {
        error!("invalid node id: {}", raw);
        process::exit(2);
    });
    NodeId(id)
}

fn amount_arg(matches: &ArgMatches, name: &str) -> Amount {
    let raw = matches.value_of(name).unwrap();
    raw.parse().unwrap_or_else(|_| {
        error!("invalid amount: {}", raw);
        process::exit(2);
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs()
}

/// Load the persisted ledger, or start a fresh one if the file doesn't
/// exist yet. Persistence is a single JSON document rather than a
/// relational schema.
fn load_store(path: &str) -> LedgerStore {
    if !Path::new(path).exists() {
        info!("{} does not exist yet; starting an empty ledger", path);
        return LedgerStore::new();
    }
    let file = File::open(path).unwrap_or_else(|e| {
        error!("failed to open {}: {}", path, e);
        process::exit(2);
    });
    serde_json::from_reader(file).unwrap_or_else(|e| {
        error!("failed to parse {}: {}", path, e);
        process::exit(2);
    })
}

fn save_store(path: &str, engine: &Engine) {
    let store = engine.snapshot_store();
    let file = File::create(path).unwrap_or_else(|e| {
        error!("failed to write {}: {}", path, e);
        process::exit(2);
    });
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &store).unwrap_or_else(|e| {
        error!("failed to serialize ledger: {}", e);
        process::exit(2);
    });
}

