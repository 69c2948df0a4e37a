//! `kc-cli` command tree.

pub mod input;
pub mod output;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::connect::config::{BasicAuth, ClientConfig, CustomHeader, DEFAULT_PARALLELISM, DEFAULT_URL};
use crate::connect::types::{ConnectorRequest, TaskRequest, NOT_FOUND};
use crate::connect::{BaseClient, HighLevelClient};
use crate::error::AppError;
use input::{load_definitions, DefinitionSource};
use output::print_response;

#[derive(Parser, Debug)]
#[command(name = "kc-cli")]
#[command(about = "Manage and deploy Kafka Connect connectors")]
#[command(version)]
pub struct Cli {
    /// Kafka Connect REST URL
    #[arg(short, long, global = true, env = "KAFKA_CONNECT_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Log every request at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Accept any server certificate
    #[arg(short = 'i', long, global = true)]
    pub insecure_skip_verify: bool,

    /// PEM client certificate for mutual TLS
    #[arg(short = 'C', long = "ssl-client-certificate", global = true, value_name = "FILE")]
    pub client_certificate: Option<PathBuf>,

    /// PEM private key for mutual TLS
    #[arg(short = 'K', long = "ssl-client-key", global = true, value_name = "FILE")]
    pub client_key: Option<PathBuf>,

    /// Basic auth username
    #[arg(short = 'U', long, global = true)]
    pub username: Option<String>,

    /// Basic auth password
    #[arg(short = 'P', long, global = true, env = "KAFKA_CONNECT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Extra header sent with every request (repeatable)
    #[arg(short = 'H', long = "header", global = true, value_name = "NAME:VALUE")]
    pub headers: Vec<CustomHeader>,

    /// Emit log lines and errors as JSON
    #[arg(short = 'j', long, global = true)]
    pub json_log: bool,

    /// Deadline of each synchronous wait, in seconds
    #[arg(long, global = true, default_value_t = 120, value_name = "SECS")]
    pub sync_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List connectors, or show one connector, its status, config or tasks
    Get(GetArgs),

    /// Create connectors from definitions
    Create(WriteArgs),

    /// Replace the config of connectors, creating them when absent
    Update(WriteArgs),

    /// Delete a connector
    Delete(TargetArgs),

    /// Pause a connector
    Pause(TargetArgs),

    /// Resume a paused connector
    Resume(TargetArgs),

    /// Restart a connector, or one of its tasks
    Restart {
        /// Connector name
        #[arg(short = 'n', long)]
        connector: String,

        /// Restart only this task
        #[arg(long)]
        task: Option<u32>,
    },

    /// Converge connectors to their definitions, updating only what changed
    Deploy(DeployArgs),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Connector name; without it every connector is listed
    #[arg(short = 'n', long)]
    pub connector: Option<String>,

    /// Show the connector's status
    #[arg(short, long, requires = "connector", conflicts_with_all = ["config", "tasks"])]
    pub status: bool,

    /// Show the connector's config
    #[arg(short, long, requires = "connector", conflicts_with = "tasks")]
    pub config: bool,

    /// Show the connector's tasks
    #[arg(short, long, requires = "connector")]
    pub tasks: bool,
}

#[derive(Args, Debug)]
pub struct DefinitionArgs {
    /// Definition file, or folder of definition files
    #[arg(short, long, value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Definition as a JSON string
    #[arg(short, long, value_name = "JSON", conflicts_with = "path")]
    pub string: Option<String>,

    /// Substitute $VAR and ${VAR} from the environment
    #[arg(long)]
    pub expand_env: bool,
}

impl DefinitionArgs {
    fn source(&self) -> Result<DefinitionSource, AppError> {
        DefinitionSource::from_flags(self.path.clone(), self.string.clone())
    }
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub definitions: DefinitionArgs,

    /// Wait until the change is visible
    #[arg(short = 'y', long)]
    pub sync: bool,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Connector name
    #[arg(short = 'n', long)]
    pub connector: String,

    /// Wait until the change is visible
    #[arg(short = 'y', long)]
    pub sync: bool,
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    #[command(flatten)]
    pub definitions: DefinitionArgs,

    /// Connectors deployed concurrently
    #[arg(short = 'r', long, default_value_t = DEFAULT_PARALLELISM)]
    pub parallel: usize,

    /// Pause running connectors while their config is replaced
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub pause: bool,
}

impl Cli {
    pub fn client_config(&self) -> ClientConfig {
        let basic_auth = match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(BasicAuth {
                    username: username.clone(),
                    password: password.clone(),
                })
            }
            (Some(_), _) | (_, Some(_)) => {
                tracing::warn!("Basic auth needs both --username and --password, ignoring");
                None
            }
            _ => None,
        };

        ClientConfig {
            url: self.url.clone(),
            insecure_skip_verify: self.insecure_skip_verify,
            client_certificate: self.client_certificate.clone(),
            client_key: self.client_key.clone(),
            basic_auth,
            headers: self.headers.clone(),
            sync_timeout_secs: self.sync_timeout,
            ..Default::default()
        }
    }
}

/// Build the client from the flags and run the selected command.
///
/// Ctrl-C cancels any synchronous wait in progress.
pub async fn execute(cli: &Cli) -> Result<(), AppError> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    let client = HighLevelClient::from_config(&cli.client_config())?.with_cancellation(cancel);
    tracing::debug!(url = %cli.url, "Kafka Connect client ready");
    dispatch(&cli.command, &client).await
}

pub async fn dispatch<C: BaseClient + 'static>(
    command: &Command,
    client: &HighLevelClient<C>,
) -> Result<(), AppError> {
    match command {
        Command::Get(args) => get(args, client).await,

        Command::Create(args) => {
            for definition in load_definitions(&args.definitions.source()?, args.definitions.expand_env)? {
                print_response(&client.create_connector(&definition, args.sync).await?)?;
            }
            Ok(())
        }

        Command::Update(args) => {
            for definition in load_definitions(&args.definitions.source()?, args.definitions.expand_env)? {
                print_response(&client.update_connector(&definition, args.sync).await?)?;
            }
            Ok(())
        }

        Command::Delete(args) => {
            let req = ConnectorRequest::new(&args.connector);
            print_response(&client.delete_connector(&req, args.sync).await?)
        }

        Command::Pause(args) => {
            let req = ConnectorRequest::new(&args.connector);
            print_response(&client.pause_connector(&req, args.sync).await?)
        }

        Command::Resume(args) => {
            let req = ConnectorRequest::new(&args.connector);
            print_response(&client.resume_connector(&req, args.sync).await?)
        }

        Command::Restart { connector, task } => match task {
            Some(task) => {
                print_response(&client.restart_task(&TaskRequest::new(connector, *task)).await?)
            }
            None => print_response(&client.restart_connector(&ConnectorRequest::new(connector)).await?),
        },

        Command::Deploy(args) => deploy(args, client).await,
    }
}

async fn get<C: BaseClient + 'static>(
    args: &GetArgs,
    client: &HighLevelClient<C>,
) -> Result<(), AppError> {
    let Some(name) = &args.connector else {
        return print_response(&client.get_all().await?);
    };
    let req = ConnectorRequest::new(name);

    if args.status {
        let resp = client.get_connector_status(&req).await?;
        ensure_found(name, resp.code)?;
        print_response(&resp)
    } else if args.config {
        let resp = client.get_connector_config(&req).await?;
        ensure_found(name, resp.code)?;
        print_response(&resp)
    } else if args.tasks {
        print_response(&client.get_all_tasks(&req).await?)
    } else {
        let resp = client.get_connector(&req).await?;
        ensure_found(name, resp.code)?;
        print_response(&resp)
    }
}

fn ensure_found(connector: &str, code: u16) -> Result<(), AppError> {
    if code == NOT_FOUND {
        return Err(AppError::Service {
            status: NOT_FOUND,
            message: format!("connector {} not found", connector),
        });
    }
    Ok(())
}

async fn deploy<C: BaseClient + 'static>(
    args: &DeployArgs,
    client: &HighLevelClient<C>,
) -> Result<(), AppError> {
    let definitions = load_definitions(&args.definitions.source()?, args.definitions.expand_env)?;

    let mut client = client.clone();
    client.set_parallelism(args.parallel);
    client.set_pause_before_deploy(args.pause);

    match definitions.as_slice() {
        [] => {
            tracing::warn!("No connector definition found, nothing to deploy");
            Ok(())
        }
        [single] => client.deploy_connector(single).await,
        many => client.deploy_multiple_connector(many).await,
    }?;

    tracing::info!(connectors = definitions.len(), "Deployment finished");
    Ok(())
}
