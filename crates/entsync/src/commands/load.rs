//! `entsync load`: run a fixture-backed list action through a loader.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use entsync_core::params::filter_by_params;
use entsync_core::{
    Action, ActionConfig, CoreError, Engine, IndexedParams, LoaderOptions, Params, SortSpec,
};

use crate::cli::{GlobalOpts, LoadArgs};
use crate::error::CliError;
use crate::output;

// ── Fixtures ────────────────────────────────────────────────────────

/// Read the collection for `cache_key`: the whole file if it is an array,
/// otherwise the array stored under that key.
fn read_fixture(path: &Path, cache_key: &str) -> Result<Vec<Value>, CliError> {
    let fixture_err = |source: Box<dyn std::error::Error + Send + Sync>| CliError::Fixture {
        path: path.display().to_string(),
        source,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| fixture_err(Box::new(e)))?;
    let doc: Value = serde_json::from_str(&raw).map_err(|e| fixture_err(Box::new(e)))?;

    match doc {
        Value::Array(items) => Ok(items),
        Value::Object(mut collections) => {
            if !collections.contains_key(cache_key) {
                return Err(CliError::CollectionNotFound {
                    cache_key: cache_key.to_owned(),
                    available: collections.keys().cloned().collect::<Vec<_>>().join(", "),
                });
            }
            match collections.remove(cache_key) {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(fixture_err(
                    format!("'{cache_key}' is not an array").into(),
                )),
            }
        }
        _ => Err(fixture_err("expected an array or an object of arrays".into())),
    }
}

/// A list action that answers from the in-memory fixture, filtered by
/// the call's indexed params the way a remote API would.
fn fixture_action(args: &LoadArgs, fixture: Arc<Vec<Value>>) -> Action {
    let mut config = ActionConfig::new(args.cache_key.as_str())
        .index_by(args.index_by.iter().cloned())
        .cache(!args.no_cache)
        .entity_name(args.cache_key.as_str());
    if !args.unique_id.is_empty() {
        config = config.unique_identifier(args.unique_id.iter().cloned());
    }

    let cache_key = args.cache_key.clone();
    let index_by = args.index_by.clone();
    Action::list(move |params: Params| {
        let fixture = Arc::clone(&fixture);
        let cache_key = cache_key.clone();
        let indexed = IndexedParams::from_params(&params, &index_by);
        async move {
            debug!(cache_key = %cache_key, indexed = %indexed, "serving fixture");
            let selected = filter_by_params(&cache_key, &fixture, &indexed)?;
            Ok::<_, CoreError>(Value::Array(selected))
        }
    })
    .with_config(config)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: LoadArgs, engine: &Engine, global: &GlobalOpts) -> Result<(), CliError> {
    let fixture = Arc::new(read_fixture(&args.fixture, &args.cache_key)?);
    let action = Arc::new(fixture_action(&args, fixture));

    let mut options = LoaderOptions::new();
    if let Some(field) = args.sort_by {
        options = options.sort(if args.desc {
            SortSpec::desc(field)
        } else {
            SortSpec::asc(field)
        });
    }
    let params: Params = args.params.into_iter().collect();

    let loader = engine.loader(action, params, options);
    loader.start().await?;
    let state = loader.state();
    loader.teardown();

    if let Some(message) = state.error {
        return Err(CliError::LoadFailed {
            cache_key: args.cache_key,
            message,
        });
    }

    let rendered = output::render_entities(&global.output, &state.data)?;
    output::print_output(&rendered, global.quiet);
    output::print_summary(
        &format!(
            "{} selected, {} cached under '{}'",
            state.data.len(),
            engine.store().data(&args.cache_key).len(),
            args.cache_key
        ),
        output::should_color(&global.color),
        global.quiet,
    );
    Ok(())
}
