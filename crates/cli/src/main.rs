use std::{fs, process};

use clap::Parser;
use repkv_cli::{App, Command};
use repkv_core::{CommitOutcome, Error, ReadOutcome, TransactionManager};
use repkv_parser as parser;
use repkv_parser::Line;

fn main() {
    let app = App::parse();
    match &app.command {
        Command::Run(args) => run(args),
        Command::Generate(args) => generate(args),
    }
}

fn run(args: &repkv_cli::RunArgs) {
    let script = fs::read_to_string(&args.input).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {e}", args.input.display());
        process::exit(1);
    });

    let mut tm = TransactionManager::new();
    for (number, line) in parser::parse_script(&script) {
        if let Err(error) = dispatch(&mut tm, &line) {
            eprintln!("line {number}: {}", describe(&error));
            process::exit(1);
        }
    }
}

/// Applies one classified line to the engine, printing the report the
/// command produces.
fn dispatch(tm: &mut TransactionManager, line: &Line) -> Result<(), Error> {
    match line {
        Line::Blank => {}
        Line::Comment(text) => println!("ignoring comment -- {text}"),
        Line::Unexpected(text) => println!("Unexpected input {text}"),
        Line::Command(command) => match command {
            parser::Command::Begin { txn } => {
                println!("Begin transaction -- {txn}");
                tm.begin(txn)?;
            }
            parser::Command::Read { txn, variable } => {
                println!("Transaction -- {txn} Read value of -- {variable}");
                match tm.read(txn, variable)? {
                    ReadOutcome::Served(Some(value)) => {
                        println!("Read value result: {value}");
                    }
                    ReadOutcome::Served(None) => println!("Read value result: None"),
                    ReadOutcome::Blocked => {
                        println!("Read failed as none of the sites hosting this var are up");
                        println!("{txn} will abort if not unblocked by recovery of any site");
                        println!("Read value result: None");
                    }
                }
            }
            parser::Command::Write {
                txn,
                variable,
                value,
            } => {
                println!("Transaction -- {txn} Write value to -- {variable}: {value}");
                if !tm.write(txn, variable, value)? {
                    println!("Transaction commit will fail as no sites were up");
                }
            }
            parser::Command::Fail { site } => {
                println!("Fail site -- {site}");
                tm.fail(site)?;
            }
            parser::Command::Recover { site } => {
                println!("Recover site -- {site}");
                if tm.recover(site)? {
                    println!("The blocked read is now unblocked for transaction");
                }
            }
            parser::Command::End { txn } => {
                println!("End transaction -- {txn}");
                match tm.end(txn)? {
                    CommitOutcome::Committed => println!("Transaction {txn} successful"),
                    CommitOutcome::Aborted(reasons) => {
                        let rendered: Vec<String> =
                            reasons.iter().map(ToString::to_string).collect();
                        println!(
                            "Transaction {txn} aborted because of conflict, [{}]",
                            rendered.join(", ")
                        );
                    }
                }
            }
            parser::Command::Dump => {
                println!("Dump");
                for (site, slots) in tm.dump() {
                    let row: Vec<String> = slots
                        .iter()
                        .map(|(variable, value)| format!("{variable}: {value}"))
                        .collect();
                    println!("Site {site} - {}", row.join(", "));
                }
            }
        },
    }
    Ok(())
}

fn describe(error: &Error) -> String {
    match error {
        Error::UnknownTransaction(name) => format!("unknown transaction {name}"),
        Error::UnknownVariable(name) => format!("unknown variable {name}"),
        Error::UnknownSite(name) => format!("unknown site {name}"),
        Error::DuplicateTransaction(name) => {
            format!("transaction {name} already exists in this run")
        }
    }
}

fn generate(args: &repkv_cli::GenerateArgs) {
    fs::create_dir_all(&args.output_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create output directory: {e}");
        process::exit(1);
    });

    let workloads = repkv_testgen::generate_mult_workloads(
        args.n_workload,
        args.n_transaction,
        args.n_op,
        args.n_concurrent,
        args.n_fault,
    );

    for workload in &workloads {
        let path = args.output_dir.join(format!("{}.txt", workload.get_id()));
        fs::write(&path, workload.render()).unwrap_or_else(|e| {
            eprintln!("Failed to write {}: {e}", path.display());
            process::exit(1);
        });

        let meta_path = args
            .output_dir
            .join(format!("{}.meta.json", workload.get_id()));
        let file = fs::File::create(&meta_path).unwrap_or_else(|e| {
            eprintln!("Failed to create {}: {e}", meta_path.display());
            process::exit(1);
        });
        serde_json::to_writer_pretty(file, workload).unwrap_or_else(|e| {
            eprintln!("Failed to write {}: {e}", meta_path.display());
            process::exit(1);
        });
    }

    println!(
        "Generated {} workloads to {}",
        workloads.len(),
        args.output_dir.display()
    );
}
