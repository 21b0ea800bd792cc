use clap::{Parser, Subcommand, ValueEnum};
use gateway_admin::auth::hash_password;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Management CLI for the gateway admin API", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAYCTL_URL", default_value = "http://localhost:8081")]
    url: String,

    /// Bearer token from `gatewayctl login`.
    #[arg(short, long, env = "GATEWAYCTL_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain a session token
    Login {
        username: String,
        #[arg(long, env = "GATEWAYCTL_PASSWORD")]
        password: String,
    },
    /// Create a `user` account
    Register {
        username: String,
        #[arg(long, env = "GATEWAYCTL_PASSWORD")]
        password: String,
    },
    /// Change the password of the logged-in account
    Passwd {
        #[arg(long)]
        old_password: String,
        #[arg(long)]
        new_password: String,
    },
    /// Print a bcrypt hash for `auth.accounts[].password_hash`
    HashPassword {
        password: String,
        #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
        cost: u32,
    },
    /// List entities of one kind
    List {
        #[arg(value_enum)]
        kind: Kind,
        #[arg(long, value_enum, default_value = "draft")]
        tier: TierArg,
    },
    /// Show one entity
    Detail {
        #[arg(value_enum)]
        kind: Kind,
        id: String,
        /// Owning resource, for methods
        #[arg(long)]
        resource: Option<String>,
        #[arg(long, value_enum, default_value = "draft")]
        tier: TierArg,
    },
    /// Delete a draft entity
    Delete {
        #[arg(value_enum)]
        kind: Kind,
        id: String,
        #[arg(long)]
        resource: Option<String>,
        /// Also remove or detach everything referencing it
        #[arg(long)]
        cascade: bool,
    },
    /// Release the draft to the gateway fleet
    Publish {
        #[arg(value_enum, default_value = "all")]
        scope: ScopeArg,
    },
    /// Cancel the in-flight release
    Cancel {
        #[arg(long)]
        release_id: Option<String>,
    },
    /// Current release status
    Status,
    /// Recent release reports
    History,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Cluster,
    Listener,
    Resource,
    Method,
    PluginGroup,
}

impl Kind {
    fn path(self) -> &'static str {
        match self {
            Kind::Cluster => "cluster",
            Kind::Listener => "listener",
            Kind::Resource => "resource",
            Kind::Method => "resource/method",
            Kind::PluginGroup => "plugin_group",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TierArg {
    Draft,
    Published,
}

impl TierArg {
    fn as_str(self) -> &'static str {
        match self {
            TierArg::Draft => "draft",
            TierArg::Published => "published",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Resource,
    Method,
    PluginGroup,
    All,
}

impl ScopeArg {
    fn path(self) -> &'static str {
        match self {
            ScopeArg::Resource => "resource/publish",
            ScopeArg::Method => "resource/method/publish",
            ScopeArg::PluginGroup => "plugin_group/publish",
            ScopeArg::All => "publish",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
    }
    let api = |method: Method, path: &str| -> RequestBuilder {
        client
            .request(method, format!("{}/config/api/{}", cli.url, path))
            .headers(headers.clone())
    };

    let request = match cli.command {
        Commands::Login { username, password } => client
            .post(format!("{}/login", cli.url))
            .json(&json!({ "username": username, "password": password })),
        Commands::Register { username, password } => client
            .post(format!("{}/register", cli.url))
            .json(&json!({ "username": username, "password": password })),
        Commands::Passwd {
            old_password,
            new_password,
        } => client
            .post(format!("{}/user/password/edit", cli.url))
            .headers(headers.clone())
            .json(&json!({ "old_password": old_password, "new_password": new_password })),
        Commands::HashPassword { password, cost } => {
            println!("{}", hash_password(&password, cost)?);
            return Ok(());
        }
        Commands::List { kind, tier } => api(Method::GET, &format!("{}/list", kind.path()))
            .query(&[("tier", tier.as_str())]),
        Commands::Detail {
            kind,
            id,
            resource,
            tier,
        } => api(Method::GET, &format!("{}/detail", kind.path()))
            .query(&key_params(kind, id, resource)?)
            .query(&[("tier", tier.as_str())]),
        Commands::Delete {
            kind,
            id,
            resource,
            cascade,
        } => api(Method::DELETE, kind.path())
            .query(&key_params(kind, id, resource)?)
            .query(&[("cascade", cascade.to_string())]),
        Commands::Publish { scope } => api(Method::PUT, scope.path()),
        Commands::Cancel { release_id } => {
            let request = api(Method::DELETE, "release");
            match release_id {
                Some(id) => request.query(&[("release_id", id)]),
                None => request,
            }
        }
        Commands::Status => api(Method::GET, "release/status"),
        Commands::History => api(Method::GET, "release/history"),
    };

    print_response(request.send().await?).await
}

fn key_params(
    kind: Kind,
    id: String,
    resource: Option<String>,
) -> Result<Vec<(&'static str, String)>, Box<dyn std::error::Error>> {
    match (kind, resource) {
        (Kind::Method, Some(resource)) => Ok(vec![("resource", resource), ("id", id)]),
        (Kind::Method, None) => Err("methods are keyed by --resource and id".into()),
        (_, _) => Ok(vec![("id", id)]),
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
