pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use fieldrelay_core::{EmployeeLocation, NewEmployee, Role};

#[derive(Debug, Parser)]
#[command(
    name = "fieldrelay",
    about = "Fieldrelay operator CLI",
    long_about = "Inspect configuration, apply migrations, check readiness, preview notification chains and maintain the employee directory.",
    after_help = "Examples:\n  fieldrelay doctor --json\n  fieldrelay chain --location Kushtia-01 --workflow order\n  fieldrelay employee import legacy-approvers.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, messaging readiness, DB connectivity and the location map")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Resolve the notification chain for a location without sending anything")]
    Chain {
        #[arg(long, help = "Location value at the chosen level, e.g. a territory name")]
        location: String,
        #[arg(long, help = "territory | area | district | zone | bd_territory | cro_territory")]
        level: Option<String>,
        #[arg(long = "business-unit")]
        business_unit: Option<String>,
        #[arg(long, help = "Use a workflow's level and role subset")]
        workflow: Option<String>,
    },
    #[command(subcommand, about = "Maintain the employee directory")]
    Employee(EmployeeCommand),
}

#[derive(Debug, Subcommand)]
enum EmployeeCommand {
    #[command(about = "Register one employee; the id is generated from the role")]
    Add(AddEmployee),
    #[command(about = "Import a JSON array of employees exported from a legacy approval sheet")]
    Import {
        #[arg(help = "Path to the JSON file")]
        path: PathBuf,
    },
}

#[derive(Debug, Args)]
struct AddEmployee {
    #[arg(long)]
    name: String,
    #[arg(long)]
    role: String,
    #[arg(long)]
    email: String,
    #[arg(long = "contact-number", default_value = "")]
    contact_number: String,
    #[arg(long = "whatsapp-number")]
    whatsapp_number: Option<String>,
    #[arg(long)]
    zone: Option<String>,
    #[arg(long)]
    district: Option<String>,
    #[arg(long)]
    area: Option<String>,
    #[arg(long)]
    territory: Option<String>,
    #[arg(long)]
    bazaar: Option<String>,
    #[arg(long)]
    upazilla: Option<String>,
    #[arg(long = "bd-territory")]
    bd_territory: Option<String>,
    #[arg(long = "cro-territory")]
    cro_territory: Option<String>,
    #[arg(long = "business-unit")]
    business_unit: Option<String>,
}

impl From<AddEmployee> for NewEmployee {
    fn from(value: AddEmployee) -> Self {
        NewEmployee {
            name: value.name,
            role: Role::new(value.role),
            email: value.email,
            contact_number: value.contact_number,
            whatsapp_number: value.whatsapp_number,
            location: EmployeeLocation {
                zone: value.zone,
                district: value.district,
                area: value.area,
                territory: value.territory,
                bazaar: value.bazaar,
                upazilla: value.upazilla,
                bd_territory: value.bd_territory,
                cro_territory: value.cro_territory,
            },
            business_unit: value.business_unit,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Chain { location, level, business_unit, workflow } => {
            commands::chain::run(&commands::chain::ChainArgs {
                location,
                level,
                business_unit,
                workflow,
            })
        }
        Command::Employee(EmployeeCommand::Add(input)) => commands::employee::add(input.into()),
        Command::Employee(EmployeeCommand::Import { path }) => commands::employee::import(&path),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
