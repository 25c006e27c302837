use std::fs;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use shard_ledger::{EpochReport, Protocol, ProtocolConfig};
use shard_store::{DocumentStore, InMemorySnapshot, SnapshotFile};
use shard_types::{AccountId, EpochId, FileId, TxId};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let protocol = Protocol::new(load_config(&cli)?);

    if let Command::Demo(args) = &cli.command {
        return cmd_demo(&protocol, args);
    }

    let file = SnapshotFile::new(&cli.db);
    let store = file
        .load()
        .with_context(|| format!("loading {}", file.path().display()))?;

    if let Some(next) = execute(&protocol, &store, &cli.command, cli.format)? {
        file.save(&next)
            .with_context(|| format!("saving {}", file.path().display()))?;
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ProtocolConfig> {
    let base = if cli.permissive {
        ProtocolConfig::permissive()
    } else {
        ProtocolConfig::default()
    };
    let config = match &cli.config {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            base.layered(&source)?
        }
        None => base,
    };
    debug!(?config, "protocol configured");
    Ok(config)
}

/// Run one command against `store`. Returns the new snapshot if the command
/// wrote anything.
pub fn execute(
    protocol: &Protocol,
    store: &InMemorySnapshot,
    command: &Command,
    format: OutputFormat,
) -> anyhow::Result<Option<InMemorySnapshot>> {
    let next = match command {
        Command::Connect(args) => {
            let (next, epoch) = protocol.open_connection(store, &args.file.parse()?)?;
            done(format, &format!("{} registered with epoch {}", args.file.bold(), epoch));
            next
        }
        Command::AddParticipant(args) => {
            let next = protocol.add_participant(
                store,
                &args.file.parse()?,
                &args.tx.parse()?,
                &args.account.parse()?,
            )?;
            done(format, &format!("{} joined {}", args.account.bold(), args.tx.yellow()));
            next
        }
        Command::Advise(args) => {
            let next = protocol.advise(
                store,
                &args.file.parse()?,
                &args.tx.parse()?,
                &args.account.parse()?,
                args.amount,
            )?;
            done(
                format,
                &format!("advised {} {} on {}", args.account.bold(), args.amount, args.tx.yellow()),
            );
            next
        }
        Command::CloseTx(args) => {
            let next = protocol.close_tx(store, &args.file.parse()?, &args.tx.parse()?)?;
            done(format, &format!("closed transaction {}", args.tx.yellow()));
            next
        }
        Command::CloseTxf(args) => {
            let next = protocol.close_txf(store, &args.file.parse()?)?;
            done(format, &format!("closed transaction file {}", args.file.bold()));
            next
        }
        Command::CloseEpoch(args) => {
            let next = protocol.close_epoch(store, EpochId(args.epoch))?;
            done(format, &format!("closed epoch {}", args.epoch));
            next
        }
        Command::Consolidate(args) => {
            let next = protocol.consolidate_account_tx(
                store,
                EpochId(args.epoch),
                &args.account.parse()?,
                &args.tx.parse()?,
            )?;
            done(
                format,
                &format!(
                    "consolidated {} / {} into epoch {}",
                    args.account.bold(),
                    args.tx,
                    args.epoch
                ),
            );
            next
        }
        Command::ConsolidateEpoch(args) => {
            let next = protocol.consolidate_epoch(store, EpochId(args.epoch))?;
            done(format, &format!("epoch {} consolidated", args.epoch));
            next
        }
        Command::Balance(args) => {
            let balance =
                protocol.balance_at(store, EpochId(args.epoch), &args.account.parse()?)?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    json!({"account": args.account, "epoch": args.epoch, "balance": balance})
                ),
                OutputFormat::Text => {
                    let shown = match balance {
                        Some(b) => b.to_string().normal(),
                        None => "unset".dimmed(),
                    };
                    println!("{} @ epoch {}: {}", args.account.bold(), args.epoch, shown);
                }
            }
            return Ok(None);
        }
        Command::Available(args) => {
            let available = protocol.available_balance(store, &args.account.parse()?)?;
            match format {
                OutputFormat::Json => {
                    println!("{}", json!({"account": args.account, "available": available}))
                }
                OutputFormat::Text => println!("{} available: {}", args.account.bold(), available),
            }
            return Ok(None);
        }
        Command::Report(args) => {
            let report = protocol.epoch_report(store, EpochId(args.epoch))?;
            print_report(&report, format);
            return Ok(None);
        }
        Command::Show => {
            println!("{}", serde_json::to_string_pretty(store.as_value())?);
            return Ok(None);
        }
        Command::Demo(args) => {
            cmd_demo(protocol, args)?;
            return Ok(None);
        }
    };
    Ok(Some(next))
}

fn done(format: OutputFormat, message: &str) {
    match format {
        OutputFormat::Text => println!("{} {}", "✓".green().bold(), message),
        OutputFormat::Json => println!("{}", json!({"ok": true})),
    }
}

fn print_report(report: &EpochReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        let files: Vec<_> = report
            .files
            .iter()
            .map(|f| {
                let open: Vec<_> = f.open_transactions.iter().map(TxId::as_str).collect();
                json!({
                    "file": f.file.as_str(),
                    "status": f.status.map(|s| s.to_string()),
                    "transactions": f.transaction_count,
                    "open_transactions": open,
                })
            })
            .collect();
        println!(
            "{}",
            json!({
                "epoch": report.epoch.get(),
                "state": report.state.to_string(),
                "ready_to_close": report.ready_to_close(),
                "files": files,
            })
        );
        return;
    }

    println!("Epoch {} ({})", report.epoch.to_string().bold(), report.state.to_string().cyan());
    if report.files.is_empty() {
        println!("  no transaction files registered");
    }
    for f in &report.files {
        let status = match f.status {
            Some(s) if s.is_closed() => s.to_string().green(),
            Some(s) => s.to_string().yellow(),
            None => "unwritten".red(),
        };
        println!(
            "  {} [{}] {} transaction(s)",
            f.file.as_str().bold(),
            status,
            f.transaction_count
        );
        for tx in &f.open_transactions {
            println!("    open: {}", tx.as_str().yellow());
        }
    }
    if report.ready_to_close() {
        println!("{} ready to close", "✓".green());
    }
}

fn cmd_demo(protocol: &Protocol, args: &DemoArgs) -> anyhow::Result<()> {
    let payer: AccountId = args.payer.parse()?;
    let payee: AccountId = args.payee.parse()?;
    let file = FileId::from("connection-1");
    let tx = TxId::from("tx-001");

    println!("{}", "Shardable ledger walkthrough".bold());

    let (store, epoch) = protocol.open_connection(&InMemorySnapshot::new(), &file)?;
    println!("  connected {} to epoch {}", file.as_str().bold(), epoch);

    let store = protocol.add_participants(&store, &file, &tx, [&payer, &payee])?;
    let store = protocol.advise(&store, &file, &tx, &payer, -args.amount)?;
    let store = protocol.advise(&store, &file, &tx, &payee, args.amount)?;
    println!(
        "  advised {} {} -> {} on {}",
        args.amount,
        payer.as_str().bold(),
        payee.as_str().bold(),
        tx.as_str().yellow()
    );
    print_available(protocol, &store, &[&payer, &payee])?;

    let store = protocol.close_tx(&store, &file, &tx)?;
    let store = protocol.close_txf(&store, &file)?;
    let store = protocol.close_epoch(&store, epoch)?;
    println!("  closed transaction, file and epoch {}", epoch);

    let store = protocol.consolidate_account_tx(&store, epoch, &payer, &tx)?;
    let store = protocol.consolidate_account_tx(&store, epoch, &payee, &tx)?;
    let store = protocol.consolidate_epoch(&store, epoch)?;
    println!("  consolidated epoch {}", epoch);

    let mut total = 0;
    for account in [&payer, &payee] {
        let balance = protocol.balance_at(&store, epoch, account)?.unwrap_or(0);
        total += balance;
        println!("  {} settled: {}", account.as_str().bold(), balance);
    }
    print_available(protocol, &store, &[&payer, &payee])?;

    if total == 0 {
        println!("{} settled balances sum to zero", "✓".green().bold());
    } else {
        println!("{} settled balances sum to {}", "✗".red().bold(), total);
    }
    println!("\n{}", serde_json::to_string_pretty(store.as_value())?);
    Ok(())
}

fn print_available<S: DocumentStore>(
    protocol: &Protocol,
    store: &S,
    accounts: &[&AccountId],
) -> anyhow::Result<()> {
    for account in accounts {
        let available = protocol.available_balance(store, account)?;
        println!("  {} available: {}", account.as_str().bold(), available);
    }
    Ok(())
}
