//! `fieldrelay chain`: resolve a notification chain without sending anything.

use std::sync::Arc;

use fieldrelay_core::{
    ChainBuilder, ChainRequest, EmployeeDirectory, HierarchyLevel, LocationMap, LocationQuery,
};

use crate::commands::{load_config, open_store, runtime, to_data, CommandResult};

#[derive(Debug, Clone, Default)]
pub struct ChainArgs {
    pub location: String,
    pub level: Option<String>,
    pub business_unit: Option<String>,
    pub workflow: Option<String>,
}

pub fn run(args: &ChainArgs) -> CommandResult {
    let config = match load_config("chain") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let request = match &args.workflow {
        Some(kind) => match config.workflows.get(kind) {
            Some(definition) => {
                definition.chain_request(&args.location, args.business_unit.as_deref())
            }
            None => {
                return CommandResult::failure(
                    "chain",
                    "invalid_argument",
                    format!("unknown workflow `{kind}`"),
                    2,
                )
            }
        },
        None => {
            let level = match args.level.as_deref().map(str::parse::<HierarchyLevel>).transpose() {
                Ok(level) => level.unwrap_or_default(),
                Err(error) => return CommandResult::failure("chain", "invalid_argument", error, 2),
            };
            ChainRequest::new(
                LocationQuery::new(level, args.location.clone()),
                args.business_unit.clone(),
            )
        }
    };

    let runtime = match runtime("chain") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let builder = ChainBuilder::new(Arc::new(config.organization.clone()));
    let result = runtime.block_on(async {
        let (pool, store) = open_store(&config).await?;
        let directory = EmployeeDirectory::load(&store)
            .await
            .map_err(|error| ("store_read", error.to_string(), 6u8))?;
        let map =
            LocationMap::load(&store).await.map_err(|error| ("store_read", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(builder.build(&directory, &map, &request))
    });

    match result {
        Ok(chain) => {
            let recipients: usize = chain.tiers.iter().map(|tier| tier.recipients.len()).sum();
            let message = format!(
                "{} tier(s), {recipients} recipient(s){}",
                chain.tiers.len(),
                if chain.is_fallback() { " via business-unit fallback" } else { "" }
            );
            CommandResult::success_with("chain", message, to_data(&chain))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chain", error_class, message, exit_code)
        }
    }
}
