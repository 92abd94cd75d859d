//! eval-cli: operaciones de turno contra el backend Postgres.
//!
//! Códigos de salida: 0 ok, 2 uso, 3 entrada inválida, 4 no encontrado o
//! rechazado por el workflow, 5 error de infraestructura.

use std::process::exit;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eval_core::store::{Stores, UserDirectory};
use eval_core::{classify, ErrorClass, RequestContext, Services, SystemClock, WorkflowError};
use eval_domain::{EvaluationId, EvaluationStatus};
use eval_persistence::{build_dev_pool_from_env, PgStore, PoolProvider};

#[derive(Parser)]
#[command(name = "eval-cli")]
#[command(about = "Evaluation workflow operator CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Usuario que ejecuta la operación (debe existir y estar activo)
    #[arg(short, long, env = "EVAL_CLI_USER")]
    user: Option<String>,

    /// Salida JSON en lugar de texto
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aprueba la etapa pendiente (part → group, group → completed)
    Approve {
        #[arg(long)]
        id: EvaluationId,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Rechaza una evaluación pendiente
    Reject {
        #[arg(long)]
        id: EvaluationId,
        #[arg(long)]
        reason: String,
    },
    /// Transición explícita a `--to <status>`
    Status {
        #[arg(long)]
        id: EvaluationId,
        #[arg(long)]
        to: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Bandeja de aprobaciones del usuario
    Pending,
    /// Conteos por estado y tipo
    Stats,
    /// Mina fail codes de un archivo de texto y los registra como provisionales
    BootstrapFailCodes {
        #[arg(long)]
        file: String,
    },
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env()
                                                  .unwrap_or_else(|_| "warn".into()))
                             .with_writer(std::io::stderr)
                             .init();

    let cli = match Cli::try_parse() {
        Ok(c) => c,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            exit(2);
        }
        Err(e) => {
            let _ = e.print();
            exit(0);
        }
    };

    let pool = match build_dev_pool_from_env() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[eval-cli] pool error: {e}");
            exit(5);
        }
    };
    let store = Arc::new(PgStore::new(PoolProvider { pool }));
    let svc = Services::standard(Stores::from_backend(store.clone()), Arc::new(SystemClock));

    if let Command::BootstrapFailCodes { file } = &cli.command {
        bootstrap_fail_codes(&svc, file, cli.json);
        return;
    }

    let Some(username) = cli.user.as_deref() else {
        eprintln!("[eval-cli] se requiere --user <username>");
        exit(2);
    };
    let actor = match store.find_by_username(username) {
        Ok(Some(u)) if u.is_active => u,
        Ok(Some(_)) => {
            eprintln!("[eval-cli] usuario deshabilitado: {username}");
            exit(4);
        }
        Ok(None) => {
            eprintln!("[eval-cli] usuario no encontrado: {username}");
            exit(4);
        }
        Err(e) => {
            eprintln!("[eval-cli] error: {e}");
            exit(5);
        }
    };
    let ctx = RequestContext::for_principal(actor.principal()).with_request("CLI", command_name(&cli.command));

    match cli.command {
        Command::Approve { id, comment } => {
            let ev = svc.workflow.approve(&ctx, id, comment.as_deref()).unwrap_or_else(|e| fail(&e));
            println!("aprobado: {} status={} version={}", ev.evaluation_number, ev.status, ev.version);
        }
        Command::Reject { id, reason } => {
            let ev = svc.workflow.reject(&ctx, id, &reason).unwrap_or_else(|e| fail(&e));
            println!("rechazado: {} status={}", ev.evaluation_number, ev.status);
        }
        Command::Status { id, to, comment } => {
            let to: EvaluationStatus = match to.parse() {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("[eval-cli status] {e}");
                    exit(3);
                }
            };
            let ev = svc.workflow.transition(&ctx, id, to, comment.as_deref()).unwrap_or_else(|e| fail(&e));
            println!("{}: {} (version {})", ev.evaluation_number, ev.status, ev.version);
        }
        Command::Pending => {
            let pending = svc.workflow.pending_approvals(&ctx).unwrap_or_else(|e| fail(&e));
            if cli.json {
                print_json(&pending);
            } else if pending.is_empty() {
                println!("sin pendientes");
            } else {
                for p in &pending {
                    println!("{:<20} {:<6} {:>4}d  {}",
                             p.evaluation.evaluation_number, p.stage, p.days_pending, p.evaluation.product_name);
                }
            }
        }
        Command::Stats => {
            let stats = svc.workflow.statistics(&ctx).unwrap_or_else(|e| fail(&e));
            if cli.json {
                print_json(&stats);
            } else {
                println!("total={} completed={}", stats.total, stats.completed);
                for (status, n) in &stats.by_status {
                    println!("  status {status:<24} {n}");
                }
                for (kind, n) in &stats.by_type {
                    println!("  type   {kind:<24} {n}");
                }
                if let Some(avg) = stats.average_completion_days {
                    println!("  avg completion days {avg:.1}");
                }
            }
        }
        Command::BootstrapFailCodes { .. } => {}
    }
}

fn bootstrap_fail_codes(svc: &Services, file: &str, json: bool) {
    let text = match std::fs::read_to_string(file) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("[eval-cli bootstrap-fail-codes] no se pudo leer {file}: {e}");
            exit(3);
        }
    };
    let mined = svc.fail_codes.mine_text(&text).unwrap_or_else(|e| fail(&e));
    if json {
        print_json(&mined);
        return;
    }
    for m in &mined {
        println!("{:<12} {:<10} {}", m.code, m.token, m.context);
    }
    println!("{} códigos", mined.len());
}

fn command_name(cmd: &Command) -> &'static str {
    match cmd {
        Command::Approve { .. } => "approve",
        Command::Reject { .. } => "reject",
        Command::Status { .. } => "status",
        Command::Pending => "pending",
        Command::Stats => "stats",
        Command::BootstrapFailCodes { .. } => "bootstrap-fail-codes",
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("[eval-cli] error serializando: {e}");
            exit(5);
        }
    }
}

fn fail(e: &WorkflowError) -> ! {
    eprintln!("error: {e}");
    let code = match classify(e) {
        ErrorClass::Validation => 3,
        ErrorClass::Infrastructure => 5,
        ErrorClass::Permission | ErrorClass::State | ErrorClass::NotFound => 4,
    };
    exit(code)
}
