//! Binario `evalflow`: demo del ciclo de aprobación, migraciones y
//! mantenimiento de la denylist.

use std::process::exit;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eval_core::identity::RegisterUser;
use eval_core::{Clock, SystemClock};
use eval_domain::{EvaluationStatus, NewEvaluation, Role};
use evalflow::app::App;
use evalflow::config::AppConfig;
use evalflow::gateway::{Gateway, RequestMeta};
use log::info;

#[derive(Parser)]
#[command(name = "evalflow")]
#[command(about = "Product evaluation workflow engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recorre el flujo new_product completo sobre el backend en memoria
    Demo,
    /// Construye el pool de Postgres (aplica migraciones pendientes)
    Migrate,
    /// Elimina de la denylist los tokens ya expirados
    PurgeTokens,
    /// Muestra la configuración efectiva (sin secretos)
    Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env()
                                                  .unwrap_or_else(|_| "info".into()))
                             .init();
    let cli = Cli::parse();
    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[evalflow] {e}");
            exit(2);
        }
    };

    let outcome = match cli.command {
        Command::Demo => run_demo(&cfg).await,
        Command::Migrate => match cfg.database.url.as_deref() {
            Some(url) => App::postgres(&cfg, url).map(|_| println!("migraciones al día")),
            None => {
                eprintln!("[evalflow migrate] requiere DB_URL o DATABASE_URL");
                exit(2);
            }
        },
        Command::PurgeTokens => App::from_config(&cfg).and_then(|app| app.purge_revoked())
                                                     .map(|n| println!("tokens purgados: {n}")),
        Command::Config => {
            println!("{cfg:#?}");
            Ok(())
        }
    };
    if let Err(e) = outcome {
        eprintln!("[evalflow] {e}");
        exit(5);
    }
}

/// Alta de una new_product, avance a aprobación y las dos firmas.
async fn run_demo(cfg: &AppConfig) -> Result<(), evalflow::errors::AppError> {
    let (app, _store) = App::in_memory(cfg, Arc::new(SystemClock))?;
    for (name, role) in [("owner", Role::User), ("pleader", Role::PartLeader), ("gleader", Role::GroupLeader)] {
        app.auth.provision(&RegisterUser { username: name.into(),
                                           email: format!("{name}@example.com"),
                                           full_name: name.to_uppercase(),
                                           password: "demo-pass".into(),
                                           role,
                                           department: None,
                                           position: None })?;
    }
    let gw = Gateway::new(Arc::new(app), cfg.request_timeout);

    let mut tokens = Vec::new();
    for name in ["owner", "pleader", "gleader"] {
        let login = gw.call(RequestMeta::new("POST", "/auth/login").from_ip("127.0.0.1"), move |app, ctx| {
                          app.auth.login(ctx, name, "demo-pass")
                      })
                      .await?;
        tokens.push(login.access);
    }

    let created = gw.call(RequestMeta::new("POST", "/evaluations").bearer(tokens[0].clone()), |app, ctx| {
                        let cmd = NewEvaluation { evaluation_type: "new_product".into(),
                                                  product_name: "A".into(),
                                                  part_number: "P-1".into(),
                                                  start_date: Some(app.services.clock.today()),
                                                  ..Default::default() };
                        app.services.evaluations.create(ctx, &cmd)
                    })
                    .await?;
    println!("creada {} ({})", created.evaluation_number, created.status);

    let id = created.id;
    let steps = [(0, Some(EvaluationStatus::InProgress)),
                 (0, Some(EvaluationStatus::PendingPartApproval)),
                 (1, None),
                 (2, None)];
    for (who, to) in steps {
        let meta = RequestMeta::new("PATCH", &format!("/evaluations/{id}/status")).bearer(tokens[who].clone());
        let ev = gw.call(meta, move |app, ctx| match to {
                       Some(to) => app.services.workflow.transition(ctx, id, to, None),
                       None => app.services.workflow.approve(ctx, id, Some("ok")),
                   })
                   .await?;
        println!("  → {} (v{})", ev.status, ev.version);
    }

    let done = gw.call(RequestMeta::new("GET", &format!("/evaluations/{id}")).bearer(tokens[0].clone()),
                       move |app, ctx| app.services.evaluations.get(ctx, id))
                 .await?;
    let local = done.evaluation.updated_at.with_timezone(&cfg.default_tz);
    info!("demo_done number={} completed_local={}", done.evaluation.evaluation_number, local);
    match serde_json::to_string_pretty(&done) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("[evalflow demo] {e}"),
    }
    Ok(())
}
