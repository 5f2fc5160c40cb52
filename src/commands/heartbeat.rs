//! The heartbeat command: enrich and deliver the current editor event.

use std::io::Read;
use std::path::Path;
use std::sync::mpsc;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::api::{Client, ClientOptions};
use crate::backoff::BackoffSender;
use crate::cli::Cli;
use crate::commands::{build_pipeline, offline as offline_cmd};
use crate::config::Settings;
use crate::error::Error;
use crate::heartbeat::{user_agent, Category, EntityType, Heartbeat};
use crate::offline::{QueueSender, SEND_LIMIT};
use crate::pipeline::Sender;
use crate::ratelimit::{self, RateLimitParams};
use crate::state::StateFile;

/// Send the current heartbeat (plus stdin extras) to the api, queueing
/// whatever could not be delivered.
pub fn run(cli: &Cli, settings: &Settings) -> Result<(), Error> {
    let queue_path = settings.queue_path()?;

    match send_heartbeats(cli, settings, &queue_path) {
        Ok(()) => {
            debug!("successfully sent heartbeat(s)");
            Ok(())
        }
        Err(err @ Error::Auth(_)) => {
            // save heartbeats when auth failed, so they are not lost
            if !settings.offline_disabled {
                if let Err(save_err) = offline_cmd::save_heartbeats(cli, settings, None, &queue_path)
                {
                    error!("failed to save heartbeats to offline queue: {save_err}");
                }
            }

            Err(err)
        }
        Err(err) => Err(err),
    }
}

fn send_heartbeats(cli: &Cli, settings: &Settings, queue_path: &Path) -> Result<(), Error> {
    let state_file = StateFile::new(settings.internal_config_path()?);
    let state = state_file.load().unwrap_or_default();

    let limited = ratelimit::rate_limited(&RateLimitParams {
        disabled: settings.offline_disabled,
        last_sent_at: state.heartbeats_last_sent_at,
        timeout: settings.rate_limit,
    });

    if limited {
        debug!("rate limited, saving heartbeats to offline queue");

        match offline_cmd::save_heartbeats(cli, settings, None, queue_path) {
            Ok(()) => return Ok(()),
            // log the queue error, then send to the api so nothing is lost
            Err(err) => error!("failed to save rate limited heartbeats: {err}"),
        }
    }

    let mut heartbeats = build_heartbeats(cli, settings);

    // only send at most SEND_LIMIT at once; the surplus is saved to the
    // queue on a parallel worker
    let mut surplus_done = None;

    if heartbeats.len() > SEND_LIMIT {
        let surplus = heartbeats.split_off(SEND_LIMIT);
        debug!("save {} extra heartbeat(s) to offline queue", surplus.len());

        let (done_tx, done_rx) = mpsc::sync_channel::<bool>(1);
        let worker_settings = settings.clone();
        let worker_queue_path = queue_path.to_path_buf();

        std::thread::spawn(move || {
            if let Err(err) =
                offline_cmd::save_batch(&worker_settings, surplus, &worker_queue_path)
            {
                error!("failed to save extra heartbeats to offline queue: {err}");
            }

            let _ = done_tx.send(true);
        });

        surplus_done = Some(done_rx);
    }

    let result = deliver(settings, &state_file, &state, queue_path, heartbeats);

    // wait for the offline queue save to finish, even on error
    if let Some(done) = surplus_done {
        let _ = done.recv();
    }

    let results = result?;

    for result in &results {
        if !result.errors.is_empty() {
            warn!("{}", result.errors.join(" "));
        }
    }

    if let Err(err) = ratelimit::reset(&state_file) {
        error!("failed to reset rate limit: {err}");
    }

    Ok(())
}

fn deliver(
    settings: &Settings,
    state_file: &StateFile,
    state: &crate::state::InternalState,
    queue_path: &Path,
    heartbeats: Vec<Heartbeat>,
) -> Result<Vec<crate::heartbeat::HeartbeatResult>, Error> {
    let client = match build_client(settings) {
        Ok(client) => client,
        Err(err) => {
            if !settings.offline_disabled && !matches!(err, Error::Auth(_)) {
                if let Err(save_err) = crate::offline::push_with_retry(queue_path, &heartbeats) {
                    error!("failed to save heartbeats to offline queue: {save_err}");
                }
            }

            return Err(err);
        }
    };

    let backoff = BackoffSender::new(
        client,
        state_file.clone(),
        state.backoff_at,
        state.backoff_retries,
    );

    let sender: Box<dyn Sender> = if settings.offline_disabled {
        Box::new(backoff)
    } else {
        Box::new(QueueSender::new(backoff, queue_path.to_path_buf()))
    };

    build_pipeline(settings, sender).run(heartbeats)
}

/// Construct the api client from resolved settings.
pub fn build_client(settings: &Settings) -> Result<Client, Error> {
    Client::new(ClientOptions {
        api_url: settings.api_url.clone(),
        api_key: settings.api_key.clone(),
        hostname: settings.hostname.clone(),
        plugin: settings.plugin.clone(),
        proxy: settings.proxy.clone(),
        ssl_certs_file: settings.ssl_certs_file.clone(),
        no_ssl_verify: settings.no_ssl_verify,
        timeout: settings.timeout,
        user_agent: user_agent(&settings.plugin),
    })
}

/// Build the outgoing batch: the main heartbeat from flags plus any extra
/// heartbeats from stdin.
pub fn build_heartbeats(cli: &Cli, settings: &Settings) -> Vec<Heartbeat> {
    let agent = user_agent(&settings.plugin);

    let mut heartbeats = vec![main_heartbeat(cli, &agent)];

    if cli.extra_heartbeats {
        let extras = read_extra_heartbeats();

        if !extras.is_empty() {
            debug!("include {} extra heartbeat(s) from stdin", extras.len());
        }

        for mut extra in extras.iter().cloned() {
            extra.user_agent = agent.clone();
            heartbeats.push(extra);
        }
    }

    heartbeats
}

fn main_heartbeat(cli: &Cli, agent: &str) -> Heartbeat {
    Heartbeat {
        branch_alternate: cli.alternate_branch.clone().unwrap_or_default(),
        category: cli.category.unwrap_or_default(),
        cursor_position: cli.cursorpos,
        entity: cli.entity.clone().unwrap_or_default(),
        entity_type: cli.entity_type.unwrap_or_default(),
        is_unsaved_entity: cli.is_unsaved_entity,
        is_write: cli.write.then_some(true),
        language: cli.language.clone(),
        language_alternate: cli.alternate_language.clone().unwrap_or_default(),
        line_additions: cli.line_additions,
        line_deletions: cli.line_deletions,
        line_number: cli.lineno,
        lines: cli.lines_in_file,
        local_file: cli.local_file.clone().unwrap_or_default(),
        project_alternate: cli.alternate_project.clone().unwrap_or_default(),
        project_override: cli.project.clone().unwrap_or_default(),
        project_path_override: cli.project_folder.clone().unwrap_or_default(),
        time: cli.time.unwrap_or_else(now_epoch),
        user_agent: agent.to_string(),
        ..Default::default()
    }
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Stdin is consumed exactly once per process; later calls return the
/// cached list.
fn read_extra_heartbeats() -> &'static [Heartbeat] {
    static EXTRA_HEARTBEATS: OnceLock<Vec<Heartbeat>> = OnceLock::new();

    EXTRA_HEARTBEATS.get_or_init(|| {
        let mut input = String::new();
        if let Err(err) = std::io::stdin().lock().read_to_string(&mut input) {
            warn!("failed to read extra heartbeats from stdin: {err}");
            return Vec::new();
        }

        parse_extra_heartbeats(&input)
    })
}

/// Parse the stdin JSON array. Plugins are inconsistent about number
/// encodings, so numeric fields also accept strings; `time` wins over the
/// legacy `timestamp` key.
pub fn parse_extra_heartbeats(input: &str) -> Vec<Heartbeat> {
    let values: Vec<serde_json::Value> = match serde_json::from_str(input.trim()) {
        Ok(values) => values,
        Err(err) => {
            warn!("failed to json decode extra heartbeats: {err}");
            return Vec::new();
        }
    };

    values.iter().filter_map(parse_extra_heartbeat).collect()
}

fn parse_extra_heartbeat(value: &serde_json::Value) -> Option<Heartbeat> {
    let entity = value.get("entity")?.as_str()?.to_string();

    let entity_type = string_field(value, "entity_type")
        .or_else(|| string_field(value, "type"))
        .and_then(|t| t.parse::<EntityType>().ok())
        .unwrap_or_default();

    let category = string_field(value, "category")
        .and_then(|c| c.parse::<Category>().ok())
        .unwrap_or_default();

    let time = float_field(value, "time")
        .or_else(|| float_field(value, "timestamp"))
        .unwrap_or_else(now_epoch);

    Some(Heartbeat {
        branch_alternate: string_field(value, "alternate_branch").unwrap_or_default(),
        category,
        cursor_position: int_field(value, "cursorpos"),
        entity,
        entity_type,
        is_unsaved_entity: bool_field(value, "is_unsaved_entity").unwrap_or(false),
        is_write: bool_field(value, "is_write"),
        language: string_field(value, "language"),
        language_alternate: string_field(value, "alternate_language").unwrap_or_default(),
        line_additions: int_field(value, "line_additions"),
        line_deletions: int_field(value, "line_deletions"),
        line_number: int_field(value, "lineno"),
        lines: int_field(value, "lines"),
        local_file: string_field(value, "local_file").unwrap_or_default(),
        project_alternate: string_field(value, "alternate_project").unwrap_or_default(),
        project_override: string_field(value, "project").unwrap_or_default(),
        project_path_override: string_field(value, "project_folder").unwrap_or_default(),
        time,
        ..Default::default()
    })
}

fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

fn bool_field(value: &serde_json::Value, key: &str) -> Option<bool> {
    let field = value.get(key)?;
    field
        .as_bool()
        .or_else(|| field.as_str().and_then(|s| s.parse().ok()))
}

fn float_field(value: &serde_json::Value, key: &str) -> Option<f64> {
    let field = value.get(key)?;
    field
        .as_f64()
        .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
}

fn int_field(value: &serde_json::Value, key: &str) -> Option<i32> {
    let field = value.get(key)?;
    field
        .as_i64()
        .map(|n| n as i32)
        .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
}
