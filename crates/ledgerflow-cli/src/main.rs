use ledgerflow_core::ledger::Ledger;
use ledgerflow_core::FlowRunView;
use ledgerflow_persistence::{PgLedger, PoolProvider};
use uuid::Uuid;

const USAGE: &str = "Uso:
  ledgerflow migrate
  ledgerflow show --run <UUID>
  ledgerflow attempts --run <UUID> [--step <NOMBRE>]";

/// Flags comunes de los subcomandos de inspección.
#[derive(Default)]
struct Args {
    run: Option<Uuid>,
    step: Option<String>,
}

fn parse_flags(args: &[String]) -> Args {
    let mut parsed = Args::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--run" => {
                i += 1;
                if i < args.len() {
                    parsed.run = Uuid::parse_str(&args[i]).ok();
                }
            }
            "--step" => {
                i += 1;
                if i < args.len() {
                    parsed.step = Some(args[i].clone());
                }
            }
            _ => {}
        }
        i += 1;
    }
    parsed
}

fn open_ledger(cmd: &str) -> PgLedger<PoolProvider> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("[ledgerflow {cmd}] requiere DATABASE_URL para operar contra backend persistente");
        std::process::exit(4);
    }
    // build_pool ya aplica las migraciones pendientes
    match ledgerflow_persistence::build_dev_pool_from_env() {
        Ok(pool) => PgLedger::from_pool(pool),
        Err(e) => {
            eprintln!("[ledgerflow {cmd}] pool error: {e}");
            std::process::exit(5);
        }
    }
}

fn load_view(cmd: &str, run_id: Uuid) -> FlowRunView {
    let ledger = open_ledger(cmd);
    match ledger.snapshot(run_id) {
        Ok(Some((run, steps))) => FlowRunView { run, steps },
        Ok(None) => {
            eprintln!("[ledgerflow {cmd}] run no encontrado: {run_id}");
            std::process::exit(4);
        }
        Err(e) => {
            eprintln!("[ledgerflow {cmd}] error: {e}");
            std::process::exit(5);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("[ledgerflow] serialización fallida: {e}");
            std::process::exit(5);
        }
    }
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().collect();
    let Some(cmd) = args.get(1).map(String::as_str) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let flags = parse_flags(&args[2..]);
    match cmd {
        "migrate" => {
            let _ledger = open_ledger(cmd);
            println!("migraciones al día");
        }
        "show" => {
            let Some(run_id) = flags.run else {
                eprintln!("Uso: ledgerflow show --run <UUID>");
                std::process::exit(2);
            };
            print_json(&load_view(cmd, run_id));
        }
        "attempts" => {
            let Some(run_id) = flags.run else {
                eprintln!("Uso: ledgerflow attempts --run <UUID> [--step <NOMBRE>]");
                std::process::exit(2);
            };
            let view = load_view(cmd, run_id);
            let rows = match flags.step.as_deref() {
                Some(name) => view.attempts_of(name),
                None => view.steps.iter().collect(),
            };
            for a in rows {
                let retry_at = a.retry_at.map(|t| t.to_rfc3339()).unwrap_or_default();
                println!("{:>3} {:<24} {:<9} {:<10} {:<32} {}",
                         a.attempt,
                         a.name,
                         a.step_type.as_str(),
                         a.status.as_str(),
                         retry_at,
                         a.error.as_deref().unwrap_or(""));
            }
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}
