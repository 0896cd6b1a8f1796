//! crisiswatch CLI
//!
//! Usage:
//!   crisiswatch --text "your text here"       # Single scan
//!   crisiswatch --interactive                 # Journaling session on stdin
//!   crisiswatch --serve                       # HTTP + WebSocket presenter adapter
//!   crisiswatch --text "text" --json          # JSON output
//!   crisiswatch --check-lexicon               # Validate the lexicon and exit

use anyhow::{bail, Context};
use clap::Parser;
use colored::{ColoredString, Colorize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crisiswatch::core::{
    run_server, AlertPresenter, CrisisEngine, EngineConfig, LoadReport, SignalScanner,
};
use crisiswatch::types::{AlertPhase, AlertState, CrisisAssessment, JournalRevision, TriggerSource, UserIntent};
use crisiswatch::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "crisiswatch",
    version = VERSION,
    about = "crisiswatch - detect crisis language in journal text and escalate gently",
    long_about = "crisiswatch scans journal text for crisis indicators using a versioned\n\
                  lexicon and drives a non-blocking escalation flow.\n\n\
                  Modes:\n  \
                  --text         Scan one text\n  \
                  --interactive  Journaling session (each line extends the entry)\n  \
                  --serve        HTTP + WebSocket presenter adapter\n\n\
                  States:\n  \
                  CLEAR        - Nothing detected\n  \
                  FLAGGED      - Signal detected, banner pending\n  \
                  BANNER_SHOWN - Non-blocking banner on screen\n  \
                  MODAL_OPEN   - Support options open\n  \
                  RESOLVED     - User chose an action\n  \
                  SUPPRESSED   - Re-detection swallowed by cooldown"
)]
struct Args {
    /// Text to scan (single mode)
    #[arg(short, long)]
    text: Option<String>,

    /// Interactive journaling session on stdin
    #[arg(short, long)]
    interactive: bool,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Show signal breakdown
    #[arg(long)]
    verbose: bool,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lexicon JSON file (overrides config)
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Debounce window in milliseconds (overrides config)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Cooldown after resolution in milliseconds (overrides config)
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Negation look-back in tokens (overrides config)
    #[arg(long)]
    negation_window: Option<usize>,

    /// Allow dismissing the modal without acknowledging first
    #[arg(long)]
    no_require_ack: bool,

    /// Append audit rows to this JSON-lines file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Validate the lexicon, print the load report and exit
    #[arg(long)]
    check_lexicon: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }
    let config = build_config(&args)?;

    if args.check_lexicon {
        run_check_lexicon(&config, &args)
    } else if args.serve {
        run_server(&args.addr, config).await
    } else if let Some(ref text) = args.text {
        run_single(text, &config, &args)
    } else {
        // Default to interactive if no mode specified
        run_interactive(config, &args).await
    }
}

/// Config file (or defaults) with CLI overrides applied
fn build_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(path) = &args.lexicon {
        config.lexicon_path = Some(path.clone());
    }
    if let Some(ms) = args.debounce_ms {
        config.debounce_ms = ms;
    }
    if let Some(ms) = args.cooldown_ms {
        config.cooldown_ms = ms;
    }
    if let Some(window) = args.negation_window {
        config.negation_window = window;
    }
    if args.no_require_ack {
        config.require_acknowledge = false;
    }
    if let Some(path) = &args.audit_log {
        config.audit_log_path = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// SINGLE + LEXICON CHECK
// =============================================================================

/// Scan one text
fn run_single(text: &str, config: &EngineConfig, args: &Args) -> anyhow::Result<()> {
    let (scanner, _) = config.build_scanner();
    let assessment = scanner.assess(&JournalRevision::new("cli", text, 0));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        print_assessment(&assessment, text, args.verbose);
    }
    Ok(())
}

fn run_check_lexicon(config: &EngineConfig, args: &Args) -> anyhow::Result<()> {
    let (scanner, report) = config.build_scanner();
    let Some(report) = report else {
        bail!("lexicon unavailable; see log for the load error");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_load_report(&report, &scanner);
    }
    Ok(())
}

fn print_load_report(report: &LoadReport, scanner: &SignalScanner) {
    println!("{} {}", "Lexicon".bold(), report.version);
    println!("  fingerprint:   {}", report.fingerprint);
    if let Some(status) = scanner.lexicon().and_then(|l| l.review_status()) {
        println!("  review status: {}", status.yellow());
    }
    println!("  entries:       {}", report.accepted);
    println!("  negation cues: {}", report.negation_cues);

    if report.is_clean() {
        println!("  {}", "no rejected entries".green());
        return;
    }
    for rejection in report.rejected_entries.iter().chain(&report.rejected_cues) {
        println!(
            "  {} #{} {}: {}",
            "rejected".red(),
            rejection.index,
            rejection.phrase.as_deref().unwrap_or("<no phrase>"),
            rejection.error
        );
    }
}

fn print_assessment(assessment: &CrisisAssessment, text: &str, verbose: bool) {
    let label = assessment.display_severity();
    let painted = match assessment.severity {
        _ if assessment.is_unavailable() => label.magenta().bold(),
        None => label.green(),
        Some(tier) if tier.level() >= 3 => label.red().bold(),
        Some(_) => label.yellow().bold(),
    };
    println!("severity: {}", painted);

    if let crisiswatch::types::AssessmentStatus::Unavailable(reason) = &assessment.status {
        println!("  {}", reason.dimmed());
        return;
    }
    if !verbose {
        return;
    }

    println!(
        "lexicon:  {} ({})",
        assessment.lexicon_version.as_deref().unwrap_or("-"),
        assessment.lexicon_fingerprint.as_deref().map(|f| &f[..f.len().min(12)]).unwrap_or("-")
    );
    for signal in &assessment.signals {
        let (start, end) = signal.span;
        let excerpt = text.get(start..end).unwrap_or(&signal.matched_phrase);
        let line = format!(
            "  {} {:<24} [{}..{}] \"{}\"",
            signal.tier, signal.category, start, end, excerpt
        );
        match &signal.negated_by {
            Some(cue) => println!("{} {}", line.dimmed(), format!("(negated by \"{}\")", cue).dimmed()),
            None => println!("{}", line),
        }
    }
}

// =============================================================================
// INTERACTIVE SESSION
// =============================================================================

/// Terminal presenter: forwards state changes to the session loop
struct ChannelPresenter {
    tx: mpsc::UnboundedSender<AlertState>,
}

impl AlertPresenter for ChannelPresenter {
    fn on_alert_state_changed(&self, _entry_id: &str, state: &AlertState) {
        let _ = self.tx.send(state.clone());
    }
}

const ENTRY_ID: &str = "terminal";

/// Each line extends the journal entry; slash commands are intents
async fn run_interactive(config: EngineConfig, args: &Args) -> anyhow::Result<()> {
    let (scanner, _) = config.build_scanner();
    let audit = config.build_audit_sink()?;
    let (tx, mut updates) = mpsc::unbounded_channel();
    let engine = CrisisEngine::start(config, scanner, Arc::new(ChannelPresenter { tx }), audit);
    engine.open_entry(ENTRY_ID, TriggerSource::Journal, None).await;

    print_header("Journal Session");
    println!("Write freely; each line is added to the entry.");
    println!("Commands: /support /call /dismiss /close /ack /open /state /quit");
    if !engine.scanner().is_available() {
        println!("{}", "Crisis detection is unavailable for this session.".magenta());
    }
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut text = String::new();
    let mut revision_seq = 0u64;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("/quit") || line.eq_ignore_ascii_case("quit") {
                    break;
                }
                if line.eq_ignore_ascii_case("/state") {
                    if let Some(state) = engine.alert_state(ENTRY_ID).await {
                        print_state(&state, args.json);
                    }
                    continue;
                }
                if let Some(command) = line.strip_prefix('/') {
                    match command.parse::<UserIntent>() {
                        Ok(intent) => {
                            let output = engine.on_intent(ENTRY_ID, intent).await?;
                            if args.verbose {
                                if args.no_color {
                                    println!("{}", output.to_parseable_string());
                                } else {
                                    println!("{}", output.to_terminal_string());
                                }
                            }
                            if output.reason.is_rejection() {
                                println!("{}", format!("{} ignored: {}", intent, output.reason.description()).dimmed());
                            }
                        }
                        Err(e) => println!("{}", e.dimmed()),
                    }
                    continue;
                }

                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(line);
                revision_seq += 1;
                engine.on_text_revision(ENTRY_ID, text.clone(), revision_seq).await?;
            }
            Some(state) = updates.recv() => {
                print_state(&state, args.json);
                if state.state == AlertPhase::Flagged {
                    // The terminal renders the banner right away
                    engine.on_presented(ENTRY_ID).await?;
                }
            }
        }
    }

    // Closing scans whatever text is still inside the debounce window
    let final_state = engine.close_entry(ENTRY_ID).await?;
    while let Ok(state) = updates.try_recv() {
        print_state(&state, args.json);
    }
    println!();
    println!(
        "Session ended. Scans: {} | final state: {}",
        engine.scan_count(),
        paint_phase(final_state.state)
    );
    if args.verbose {
        for record in engine.audit_records(ENTRY_ID).unwrap_or_default() {
            println!("  {}", record.to_json_line()?.dimmed());
        }
    }
    Ok(())
}

fn print_state(state: &AlertState, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(state) {
            println!("{}", line);
        }
        return;
    }

    let severity = state.last_severity.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string());
    println!("{} {} severity={}", state.state.emoji(), paint_phase(state.state), severity);
    match state.state {
        AlertPhase::BannerShown => {
            println!("  {}", "It sounds like things might be heavy right now. Support is here if you want it. (/open)".yellow());
        }
        AlertPhase::ModalOpen if state.acknowledged_at.is_none() => {
            println!("  {}", "/support  talk to someone   /call  call for help   /ack  I've read this".red());
        }
        AlertPhase::ModalOpen => {
            println!("  {}", "/support  talk to someone   /call  call for help   /dismiss  not now".red());
        }
        AlertPhase::Resolved => {
            if let Some(action) = state.resolved_action {
                println!("  {}", format!("resolved: {}", action).blue());
            }
        }
        _ => {}
    }
    if state.assessment_unavailable {
        println!("  {}", "crisis detection unavailable for the latest text".magenta());
    }
}

fn paint_phase(phase: AlertPhase) -> ColoredString {
    let label = phase.to_string();
    match phase {
        AlertPhase::Clear => label.green(),
        AlertPhase::Flagged => label.yellow(),
        AlertPhase::BannerShown => label.yellow().bold(),
        AlertPhase::ModalOpen => label.red().bold(),
        AlertPhase::Resolved => label.blue(),
        AlertPhase::Suppressed => label.dimmed(),
    }
}

/// Print header
fn print_header(mode: &str) {
    let rule = "========================================";
    println!("{}", rule.bold());
    println!("{}", format!("  crisiswatch v{} - {}", VERSION, mode).bold());
    println!("{}", rule.bold());
    println!();
}
