// Dynamips Control: Driving the Dynamips Hypervisor
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use dynamips::platform::Platform;
use dynamips::router::{RouterParams, RouterSetting};
use dynamips::{Dynamips, DynamipsConfig, Project};

use clap::{Args, Parser, Subcommand};
use log::*;
use std::error::Error;
use std::path::PathBuf;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let args = CommandLineArguments::parse();

    let config = match args.config {
        Some(path) => DynamipsConfig::from_file(path)?,
        None => DynamipsConfig::default(),
    };
    let manager = Dynamips::new(config);

    let result = match args.cmd {
        MainCommand::Version { working_dir } => version(&manager, working_dir).await,
        MainCommand::Idlepc { router } => idlepc(&manager, router, false).await,
        MainCommand::Proposals { router } => idlepc(&manager, router, true).await,
    };

    manager.shutdown().await;
    result
}

/// Start a hypervisor and print its version.
async fn version(manager: &Dynamips, working_dir: PathBuf) -> Result<(), Box<dyn Error>> {
    let project = Project::new(Uuid::new_v4(), working_dir);
    std::fs::create_dir_all(project.module_working_directory())?;
    let hypervisor = manager.start_new_hypervisor(&project).await?;
    println!("Dynamips {}", hypervisor.version());
    manager.close_project(&project).await?;
    Ok(())
}

/// Create a temporary router, and either compute its idle-PC value, or print all proposals.
async fn idlepc(manager: &Dynamips, args: RouterArgs, only_proposals: bool) -> Result<(), Box<dyn Error>> {
    let platform: Platform = args.platform.parse()?;
    let project = Project::new(Uuid::new_v4(), args.working_dir);
    std::fs::create_dir_all(project.module_working_directory())?;

    let mut params = RouterParams::new("R1", platform, args.image);
    if let Some(ram) = args.ram {
        params.settings.push(RouterSetting::Ram(ram));
    }
    let router = manager.create_router(&project, None, params).await?;
    info!("Router {} created on {}", router.name, platform);

    let result = if only_proposals {
        manager.idle_pc_proposals(router.node_id).await.map(|proposals| {
            for proposal in proposals {
                println!("{}", proposal);
            }
        })
    } else {
        manager.auto_idle_pc(router.node_id).await.map(|value| println!("{}", value))
    };

    manager.close_project(&project).await?;
    Ok(result?)
}

#[derive(Parser, Debug)]
#[clap(name = "Dynamips Control", version = "0.1.0", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// JSON file with the settings of the controller
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand, Debug)]
enum MainCommand {
    #[clap(about = "Start a hypervisor and print its version")]
    Version {
        /// Directory in which the hypervisor is started
        #[clap(short, long, default_value = ".")]
        working_dir: PathBuf,
    },
    #[clap(about = "Compute and configure an idle-PC value for an IOS image")]
    Idlepc {
        #[clap(flatten)]
        router: RouterArgs,
    },
    #[clap(about = "Print all idle-PC proposals for an IOS image")]
    Proposals {
        #[clap(flatten)]
        router: RouterArgs,
    },
}

#[derive(Args, Debug)]
struct RouterArgs {
    /// Platform of the router, e.g. c7200
    platform: String,
    /// Path to the IOS image
    image: PathBuf,
    /// RAM of the router, in MB
    #[clap(short, long)]
    ram: Option<u32>,
    /// Directory in which the hypervisor is started
    #[clap(short, long, default_value = ".")]
    working_dir: PathBuf,
}
