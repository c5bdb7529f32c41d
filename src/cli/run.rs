//! `stride run` and `stride config check`.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use super::{config_path, RunArgs};
use crate::config::{FileConfigRepository, Settings};
use crate::error::Result;
use crate::task::{
    AgentTaskRunner, InMemoryQueueFactory, QueueFactory, RedisQueueFactory, Task, TaskRegistry, TaskRunner,
    QUEUE_START,
};
use crate::types::{EventKind, StepEventStatus, StreamItem, ToolEventStatus, UserInput};

const POLL_MS: u64 = 500;

/// How a stretch of output ended.
enum Pause {
    Done,
    Waiting,
}

pub async fn handle_run(args: RunArgs, settings: &Settings) -> Result<()> {
    let config = FileConfigRepository::new(config_path(args.config, settings)).load()?;
    let queues: Arc<dyn QueueFactory> = if args.memory_queue {
        Arc::new(InMemoryQueueFactory)
    } else {
        Arc::new(RedisQueueFactory::open(&settings.redis_url())?)
    };
    let registry = TaskRegistry::new(queues);
    let runner: Arc<dyn TaskRunner> = Arc::new(AgentTaskRunner::from_config(&config)?);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut message = args.goal.join(" ");
    let outcome = loop {
        match run_once(&registry, &runner, message).await {
            Ok(Pause::Done) => break Ok(()),
            Ok(Pause::Waiting) => match read_reply(&mut stdin).await {
                Ok(Some(reply)) => message = reply,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            },
            Err(e) => break Err(e),
        }
    };

    registry.shutdown().await;
    runner.destroy().await?;
    outcome
}

pub fn handle_config_check(path: Option<PathBuf>, settings: &Settings) -> Result<()> {
    let path = config_path(path, settings);
    let config = FileConfigRepository::new(path.clone()).load()?;
    config.validate()?;
    println!(
        "{}: ok ({} MCP servers, model {})",
        path.display(),
        config.mcp_config.servers.len(),
        config.llm_config.model_name
    );
    Ok(())
}

async fn run_once(registry: &TaskRegistry, runner: &Arc<dyn TaskRunner>, message: String) -> Result<Pause> {
    let task = registry.create(runner.clone())?;
    task.input()
        .put(serde_json::to_string(&UserInput::new(message))?)
        .await?;
    task.invoke();
    follow_output(&task).await
}

/// Print output events until `Done`, `Wait` or the task ends.
async fn follow_output(task: &Task) -> Result<Pause> {
    let mut last = QUEUE_START.to_string();
    loop {
        let entry = match task.output().get(Some(&last), Some(POLL_MS)).await? {
            Some(entry) => entry,
            None if task.done() => match task.output().get(Some(&last), None).await? {
                Some(entry) => entry,
                None => return Ok(Pause::Done),
            },
            None => continue,
        };
        last = entry.id;

        let item: StreamItem = serde_json::from_str(&entry.payload)?;
        render(&item);
        match item.event().map(|e| &e.kind) {
            Some(EventKind::Done) => return Ok(Pause::Done),
            Some(EventKind::Wait) => return Ok(Pause::Waiting),
            _ => {}
        }
    }
}

async fn read_reply(stdin: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;
    Ok(stdin.next_line().await?)
}

fn render(item: &StreamItem) {
    let Some(event) = item.event() else {
        tracing::debug!(?item, "unrecognized event");
        return;
    };
    match &event.kind {
        EventKind::Title { title } => println!("# {title}"),
        EventKind::Plan { plan, status } => {
            eprintln!("plan {status:?}:");
            for (i, step) in plan.steps.iter().enumerate() {
                eprintln!("  {}. [{}] {}", i + 1, step.status, step.description);
            }
        }
        EventKind::Step { step, status } => match status {
            StepEventStatus::Started => eprintln!("> {}", step.description),
            StepEventStatus::Completed => eprintln!("  done: {}", step.description),
            StepEventStatus::Failed => {
                eprintln!("  failed: {} ({})", step.description, step.error.as_deref().unwrap_or("unknown"))
            }
        },
        EventKind::Tool {
            function_name, status, ..
        } => {
            if *status == ToolEventStatus::Calling {
                eprintln!("  tool {function_name}");
            }
        }
        EventKind::Message {
            message, attachments, ..
        } => {
            if !message.is_empty() {
                println!("{message}");
            }
            for file in attachments {
                println!("  attachment: {}", file.filepath);
            }
        }
        EventKind::Error { error } => eprintln!("error: {error}"),
        EventKind::Wait | EventKind::Done => {}
    }
}
