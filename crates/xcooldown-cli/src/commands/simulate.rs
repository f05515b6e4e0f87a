//! Drive one click through a real [`Session`] event loop.
//!
//! The page and overlays are headless and the clock is manual, so a full
//! cooldown completes in a couple of ticks of wall time. The store is the
//! on-disk one unless `--dry-run` is given.

use std::error::Error;

use clap::Args;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use xcooldown_core::{
    ClickDisposition, Clock, Config, HeadlessRenderer, HostEvent, ManualClock, MemoryStore,
    PersistedState, Session, SqliteStore, Store, SystemClock, UserChoice, VirtualPage,
};

#[derive(Args)]
pub struct SimulateArgs {
    /// `data-testid` of the clicked element (e.g. like, retweet, tweetButton)
    #[arg(long, default_value = "like")]
    testid: String,
    /// Reflection typed into the confirmation box
    #[arg(long, default_value = "simulated reflection from the CLI")]
    reflection: String,
    /// Press "Never mind" during the countdown instead of waiting it out
    #[arg(long)]
    cancel: bool,
    /// Run against a throwaway in-memory store
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    gated: bool,
    disposition: &'static str,
    ritual: bool,
    replayed: bool,
    overlays: Vec<String>,
    state: PersistedState,
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn Error>> {
    let config = Config::load_or_default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let report = if args.dry_run {
        runtime.block_on(simulate(MemoryStore::new(), &config, &args))?
    } else {
        runtime.block_on(simulate(SqliteStore::open()?, &config, &args))?
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn simulate<S: Store>(
    store: S,
    config: &Config,
    args: &SimulateArgs,
) -> Result<SimulationReport, Box<dyn Error>> {
    let clock = ManualClock::new(SystemClock.now_ms());
    let mut page = VirtualPage::new();
    let node = page.insert(&args.testid);

    let mut session = Session::new(store, page, HeadlessRenderer::new(), clock.clone(), config);
    session.boot();
    let gated = session.page().listener_count(node) > 0;

    // Only an idle gate leads to the confirmation overlay.
    let now = clock.now_ms();
    let before = PersistedState::load(session.store());
    let ritual = gated && before.cooldown_until <= now && before.unlocked_until <= now;
    let cooldown_ms = session
        .engine()
        .compute_next_escalation(session.store(), now)
        .duration_ms;

    let tick = config.tick_interval();
    let (tx, rx) = mpsc::unbounded_channel();
    let driver = async move {
        // An ungated element never reaches the capture listener.
        let disposition = if gated {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(HostEvent::Click {
                node,
                reply: Some(reply_tx),
            })?;
            reply_rx.await?
        } else {
            ClickDisposition::PassThrough
        };

        if ritual {
            tx.send(HostEvent::Choice(UserChoice::Proceed {
                reflection: args.reflection.clone(),
            }))?;
            tokio::time::sleep(tick).await;
            if args.cancel {
                tx.send(HostEvent::Choice(UserChoice::NeverMind))?;
            } else {
                clock.advance_ms(cooldown_ms);
            }
            tokio::time::sleep(tick * 2).await;
        }
        tx.send(HostEvent::Shutdown)?;
        Ok::<_, Box<dyn Error>>(disposition)
    };

    let (session, disposition) = tokio::join!(session.run(rx), driver);
    let disposition = disposition?;

    let state = PersistedState::load(session.store());
    let replayed = !session.page().activations().is_empty();
    let overlays = session.renderer().history().to_vec();
    tracing::debug!(gated, ritual, replayed, "simulation finished");

    Ok(SimulationReport {
        gated,
        disposition: match disposition {
            ClickDisposition::PassThrough => "pass_through",
            ClickDisposition::Intercepted => "intercepted",
        },
        ritual,
        replayed,
        overlays,
        state,
    })
}
