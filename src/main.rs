use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use rsource::config::{FormatHint, SessionConfig, Timeouts};
use rsource::master::DEFAULT_MASTER_SERVER;
use rsource::{EngineType, Filter, MasterDirectory, RconSession, Region, ServerSession};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Socket timeout in milliseconds
    #[clap(short, long, default_value = "5000")]
    timeout: u64,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// A2S_INFO
    Info(Target),
    /// A2S_PLAYER
    Players(Target),
    /// A2S_RULES
    Rules(Target),
    /// Round-trip time of an info query
    Ping(Target),
    /// Run an RCON command
    Rcon {
        #[clap(flatten)]
        target: Target,
        #[clap(short, long)]
        password: String,
        /// Command and arguments
        #[clap(required = true)]
        command: Vec<String>,
    },
    /// List servers from the master server
    Master {
        #[clap(long, default_value = DEFAULT_MASTER_SERVER)]
        server: String,
        #[clap(short, long, value_enum, default_value = "rest-of-world")]
        region: RegionArg,
        #[clap(long)]
        dedicated: bool,
        #[clap(long)]
        secure: bool,
        #[clap(long)]
        gamedir: Option<String>,
        #[clap(long)]
        map: Option<String>,
        #[clap(long)]
        app_id: Option<u32>,
        #[clap(long)]
        not_empty: bool,
    },
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Server address, e.g. 127.0.0.1:27015
    address: SocketAddr,
    #[clap(short, long, value_enum, default_value = "source")]
    engine: EngineArg,
    /// Skip format probing and use the obsolete info format
    #[clap(long)]
    obsolete: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Goldsource,
    Source,
}

impl From<EngineArg> for EngineType {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Goldsource => EngineType::GoldSource,
            EngineArg::Source => EngineType::Source,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RegionArg {
    UsEast,
    UsWest,
    SouthAmerica,
    Europe,
    Asia,
    Australia,
    MiddleEast,
    Africa,
    RestOfWorld,
}

impl From<RegionArg> for Region {
    fn from(arg: RegionArg) -> Self {
        match arg {
            RegionArg::UsEast => Region::UsEast,
            RegionArg::UsWest => Region::UsWest,
            RegionArg::SouthAmerica => Region::SouthAmerica,
            RegionArg::Europe => Region::Europe,
            RegionArg::Asia => Region::Asia,
            RegionArg::Australia => Region::Australia,
            RegionArg::MiddleEast => Region::MiddleEast,
            RegionArg::Africa => Region::Africa,
            RegionArg::RestOfWorld => Region::RestOfWorld,
        }
    }
}

async fn open(target: &Target, timeouts: Timeouts) -> rsource::Result<ServerSession> {
    let format = if target.obsolete {
        FormatHint::Obsolete
    } else {
        FormatHint::Probe
    };
    let config = SessionConfig {
        timeouts,
        format,
        ..Default::default()
    };
    ServerSession::connect(target.address, target.engine.into(), config).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let timeouts = Timeouts::uniform(Duration::from_millis(args.timeout));

    match args.command {
        Command::Info(target) => {
            let info = open(&target, timeouts).await?.get_info().await?;
            println!("{:#?}", info);
        }
        Command::Players(target) => {
            for player in open(&target, timeouts).await?.get_players().await? {
                println!(
                    "{:<32} {:>6} {:>8.0}s",
                    player.name,
                    player.score,
                    player.duration.as_secs_f32()
                );
            }
        }
        Command::Rules(target) => {
            for rule in open(&target, timeouts).await?.get_rules().await? {
                println!("{} = {}", rule.name, rule.value);
            }
        }
        Command::Ping(target) => {
            let rtt = open(&target, timeouts).await?.ping().await?;
            println!("{} ms", rtt.as_millis());
        }
        Command::Rcon {
            target,
            password,
            command,
        } => {
            let mut rcon =
                RconSession::authorize(target.address, target.engine.into(), &password, timeouts)
                    .await?;
            let output = rcon.send_command(&command.join(" ")).await?;
            print!("{}", output);
            rcon.close();
        }
        Command::Master {
            server,
            region,
            dedicated,
            secure,
            gamedir,
            map,
            app_id,
            not_empty,
        } => {
            let filter = Filter {
                is_dedicated: dedicated,
                is_secure: secure,
                game_dir: gamedir,
                map,
                app_id,
                is_not_empty: not_empty,
                ..Default::default()
            };
            let directory = MasterDirectory::new(server, timeouts);
            let mut total = 0usize;
            directory
                .enumerate(region.into(), &filter, |batch| {
                    total += batch.len();
                    for addr in batch {
                        println!("{}", addr);
                    }
                })
                .await?;
            info!("{} server(s) listed", total);
        }
    }

    Ok(())
}
