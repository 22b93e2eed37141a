//! orc CLI entry point.

use anyhow::Result;
use clap::Parser;

use orc::cli::app::App;
use orc::cli::commands::{automation, config, init, initiative, run, search, task, worktree};
use orc::cli::{AutomationCommands, Cli, Commands, ConfigCommands, InitiativeCommands};
use orc::infrastructure::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init works outside a project and before logging setup
    if let Commands::Init { force } = &cli.command {
        return init::handle_init(*force, cli.json);
    }

    let app = App::bootstrap().await?;
    let _log_guard = logging::init(&app.config.logging, Some(&app.root));

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::New {
            title,
            description,
            weight,
            category,
            priority,
            workflow,
            initiative,
            depends_on,
        } => {
            task::handle_new(
                &app, title, description, &weight, category, priority, workflow, initiative,
                depends_on, cli.json,
            )
            .await?;
        }

        Commands::Run { task_id, force } => {
            run::handle_run(&app, &task_id, force, None, cli.json).await?;
        }

        Commands::Resume {
            task_id,
            force,
            from_phase,
        } => {
            run::handle_run(&app, &task_id, force, from_phase, cli.json).await?;
        }

        Commands::Reset { task_id, force } => {
            task::handle_reset(&app, &task_id, force, cli.json).await?;
        }

        Commands::Resolve {
            task_id,
            force,
            cleanup,
            message,
        } => {
            task::handle_resolve(&app, &task_id, force, cleanup, message, cli.json).await?;
        }

        Commands::Status => task::handle_status(&app, cli.json).await?,

        Commands::Show { task_id } => task::handle_show(&app, &task_id, cli.json).await?,

        Commands::Deps { task_id } => task::handle_deps(&app, &task_id, cli.json).await?,

        Commands::Diff { task_id } => worktree::handle_diff(&app, &task_id).await?,

        Commands::Cleanup {
            task_id,
            dry_run,
            all,
            force,
        } => {
            worktree::handle_cleanup(&app, task_id.as_deref(), dry_run, all, force, cli.json)
                .await?;
        }

        Commands::Automation { command } => match command {
            AutomationCommands::List => automation::handle_list(&app, cli.json).await?,
            AutomationCommands::Show { trigger_id } => {
                automation::handle_show(&app, &trigger_id, cli.json).await?;
            }
            AutomationCommands::Enable { trigger_id } => {
                automation::handle_set_enabled(&app, &trigger_id, true)?;
            }
            AutomationCommands::Disable { trigger_id } => {
                automation::handle_set_enabled(&app, &trigger_id, false)?;
            }
            AutomationCommands::Run => automation::handle_run(&app, cli.json).await?,
            AutomationCommands::History { trigger_id, limit } => {
                automation::handle_history(&app, trigger_id.as_deref(), limit, cli.json).await?;
            }
            AutomationCommands::Reset { trigger_id } => {
                automation::handle_reset(&app, &trigger_id).await?;
            }
        },

        Commands::Initiative { command } => match command {
            InitiativeCommands::Plan { manifest } => {
                initiative::handle_plan(&app, &manifest, cli.json).await?;
            }
        },

        Commands::Config { command } => match command {
            ConfigCommands::Show => config::handle_show(&app, cli.json)?,
            ConfigCommands::Get { key } => config::handle_get(&app, &key)?,
            ConfigCommands::Resolution => config::handle_resolution(&app, cli.json)?,
        },

        Commands::Search { query, limit } => {
            search::handle_search(&app, &query, limit, cli.json).await?;
        }
    }

    Ok(())
}
