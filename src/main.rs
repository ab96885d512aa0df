use std::io::Write;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use console::{style, Term};
use futures::StreamExt;

use genflow::config::AppConfig;
use genflow::core::flow::{
    CancellationToken, CrisisAcknowledgment, CrisisSupport, Experience, FlowError, FlowHandle,
    FlowInput, GenerationError, GenerationOutput, GenerationPipeline, Generator, LogSink,
    PhaseState, RunOutcome,
};
use genflow::core::logging;

const USAGE: &str = "\
Usage: genflow <prayer|sermon|ask> [--skip] <text...>
       genflow config

Options:
  --skip    Show the whole result at once instead of revealing it";

struct Args {
    experience: Experience,
    skip: bool,
    text: String,
}

enum Command {
    Run(Args),
    PrintConfig,
}

fn parse_args() -> Result<Command, String> {
    let mut args = std::env::args().skip(1);
    let first = args.next().ok_or_else(|| USAGE.to_string())?;
    match first.as_str() {
        "-h" | "--help" => return Err(USAGE.to_string()),
        "config" => return Ok(Command::PrintConfig),
        _ => {}
    }

    let experience = first.parse::<Experience>().map_err(|e| e.to_string())?;
    let mut skip = false;
    let mut words = Vec::new();
    for arg in args {
        if arg == "--skip" {
            skip = true;
        } else {
            words.push(arg);
        }
    }

    Ok(Command::Run(Args {
        experience,
        skip,
        text: words.join(" "),
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let command = match parse_args() {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(2);
        }
    };

    // File-only logging keeps the terminal clear for revealed text
    let _log_guard = logging::init_quiet();
    log::info!("genflow v{} starting", genflow::VERSION);

    let config = AppConfig::load();
    let args = match command {
        Command::PrintConfig => {
            println!("# {}", AppConfig::config_path().display());
            print!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        Command::Run(args) => args,
    };

    let mut pipeline = GenerationPipeline::new(
        config.pipeline_config(args.experience),
        Arc::new(TemplateGenerator::new(args.experience)),
        Arc::new(config.moderator()),
    )
    .with_sink(Arc::new(LogSink));
    if let Some(breaker) = config.circuit_breaker() {
        pipeline = pipeline.with_circuit_breaker(breaker);
    }

    let input = FlowInput::new(args.text).with_tag("experience", args.experience.name());
    let mut handle = match pipeline.start(input) {
        Ok(handle) => handle,
        Err(err) => {
            logging::print_error(&err.to_string());
            process::exit(exit_code(&pipeline.phase()));
        }
    };

    follow(&mut handle, args.skip).await?;

    let outcome = handle.wait().await;
    report(&outcome);
    process::exit(exit_code(&outcome.phase));
}

/// Print phase changes and revealed units until the run settles.
async fn follow(handle: &mut FlowHandle, skip: bool) -> std::io::Result<()> {
    let mut phases = Box::pin(handle.observe());
    let mut phases_done = false;
    let mut units_done = false;
    let mut skipped = false;
    let mut stdout = std::io::stdout();

    while !(phases_done && units_done) {
        tokio::select! {
            snapshot = phases.next(), if !phases_done => match snapshot {
                Some(snapshot) => match &snapshot.phase {
                    PhaseState::Interrupted { support } => {
                        show_crisis_support(support);
                        acknowledge(handle).await?;
                    }
                    PhaseState::Revealing { .. } | PhaseState::Completed { .. } => {}
                    phase => println!("{}", logging::phase_label(phase)),
                },
                None => phases_done = true,
            },
            unit = handle.next_unit(), if !units_done => match unit {
                Some(unit) => {
                    if unit.index == 0 {
                        println!();
                    }
                    print!("{}", unit.text);
                    stdout.flush()?;
                    if skip && !skipped {
                        skipped = true;
                        // Already fully revealed is fine too
                        let _ = handle.skip_reveal();
                    }
                }
                None => units_done = true,
            },
            _ = tokio::signal::ctrl_c() => {
                if let Err(err) = handle.cancel() {
                    log::debug!("Ignoring interrupt: {}", err);
                }
            }
        }
    }
    println!();
    Ok(())
}

fn show_crisis_support(support: &CrisisSupport) {
    println!();
    logging::print_panel(
        "You are not alone",
        &format!(
            "{}\n\n{}",
            support.message(),
            logging::format_resources(support.resources())
        ),
    );
}

async fn acknowledge(handle: &FlowHandle) -> std::io::Result<()> {
    loop {
        print!("{} ", style("Type 'ok' once you have read the above:").magenta());
        std::io::stdout().flush()?;
        let line = tokio::task::spawn_blocking(|| Term::stdout().read_line())
            .await
            .map_err(std::io::Error::other)??;
        if line.trim().eq_ignore_ascii_case("ok") {
            break;
        }
    }

    if let Err(err) = handle
        .dismiss_crisis_interrupt(CrisisAcknowledgment::confirmed_by_user())
        .await
    {
        log::warn!("Failed to dismiss crisis interrupt: {}", err);
    }
    Ok(())
}

fn report(outcome: &RunOutcome) {
    match &outcome.phase {
        PhaseState::Completed { .. } => logging::print_success(&format!(
            "Done in {:.1}s ({} attempt{})",
            outcome.elapsed.as_secs_f32(),
            outcome.attempts.len(),
            if outcome.attempts.len() == 1 { "" } else { "s" }
        )),
        PhaseState::Failed { error } => logging::print_error(&error.to_string()),
        PhaseState::Cancelled => logging::print_warning("Cancelled"),
        PhaseState::Idle => logging::print_info("Take care of yourself."),
        other => logging::print_warning(&format!("Stopped while {}", other.name())),
    }
}

fn exit_code(phase: &PhaseState) -> i32 {
    match phase {
        PhaseState::Completed { .. } | PhaseState::Idle => 0,
        PhaseState::Failed {
            error: FlowError::Validation(_),
        } => 2,
        PhaseState::Failed {
            error: FlowError::Policy(_),
        } => 3,
        PhaseState::Cancelled => 130,
        _ => 1,
    }
}

// ============================================================================
// Demo Generator
// ============================================================================

/// Offline generator that fills a per-experience template after a short,
/// cancellable pause standing in for model latency.
struct TemplateGenerator {
    experience: Experience,
    latency: Duration,
}

impl TemplateGenerator {
    fn new(experience: Experience) -> Self {
        Self {
            experience,
            latency: Duration::from_millis(600),
        }
    }

    fn compose(&self, text: &str) -> GenerationOutput {
        let topic = text.trim().trim_end_matches(['.', '!', '?']);
        match self.experience {
            Experience::Prayer => GenerationOutput::new(format!(
                "Lord, hear this prayer for {topic}. Grant patience for today, \
                 courage for tomorrow, and peace in the waiting. Amen."
            )),
            Experience::Sermon => GenerationOutput::new(format!(
                "Today we reflect on {topic}. \"Come to me, all who labour and are \
                 heavy laden, and I will give you rest\" (Matthew 11:28). Rest is not \
                 the absence of work. It is trust carried into the work itself. \
                 Go this week and practise that trust."
            ))
            .with_citation("Matthew 11:28"),
            Experience::Ask => GenerationOutput::new(format!(
                "You asked about {topic}. A good place to start is Psalm 46:10, \
                 \"Be still, and know.\" Read it slowly, then sit with one phrase \
                 for a few minutes."
            ))
            .with_citation("Psalm 46:10"),
        }
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    async fn generate(
        &self,
        input: &FlowInput,
        signal: &CancellationToken,
    ) -> Result<GenerationOutput, GenerationError> {
        tokio::select! {
            _ = signal.cancelled() => Err(GenerationError::transient("cancelled")),
            _ = tokio::time::sleep(self.latency) => Ok(self.compose(input.text())),
        }
    }
}
