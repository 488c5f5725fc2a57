use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use subtag_annotation::{NewSense, SenseId, TaggingSignal, TaggingState, first_untagged};
use subtag_annotation_sync::{
    AnnotationStore, BoxFuture, Error, PlaybackClock, TaggingSession,
};

use super::inspect;

#[derive(clap::Args)]
pub struct Args {
    #[arg(long)]
    pub media: String,
    /// Wall-clock interval between ticks.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,
    /// Media seconds played per wall-clock second.
    #[arg(long, default_value_t = 4.0, value_parser = parse_speed)]
    pub speed: f64,
    /// Tag each focused token with a sense for its word instead of
    /// overriding the pause.
    #[arg(long)]
    pub auto_tag: bool,
}

fn parse_speed(s: &str) -> Result<f64, String> {
    let speed: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if speed.is_finite() && speed > 0.0 {
        Ok(speed)
    } else {
        Err(format!("speed must be a positive number, got {s}"))
    }
}

/// Playback position advanced by hand. Both readings agree, so the
/// authoritative query always wins the race.
pub struct SimulatedClock {
    bits: AtomicU64,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn position(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    pub fn advance(&self, seconds: f64) {
        let next = self.position() + seconds;
        self.bits.store(next.to_bits(), Ordering::SeqCst);
    }
}

impl PlaybackClock for SimulatedClock {
    fn query_position(&self) -> BoxFuture<'_, Option<f64>> {
        Box::pin(async move { Some(self.position()) })
    }

    fn local_position(&self) -> f64 {
        self.position()
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ReplayStats {
    pub pauses: usize,
    pub tagged: usize,
    pub overrides: usize,
}

pub async fn run(store: &AnnotationStore, args: Args) -> anyhow::Result<()> {
    let stats = replay(store, &args).await?;
    println!(
        "{} pauses, {} tokens tagged, {} overrides",
        stats.pauses, stats.tagged, stats.overrides
    );
    Ok(())
}

pub async fn replay(store: &AnnotationStore, args: &Args) -> anyhow::Result<ReplayStats> {
    anyhow::ensure!(args.tick_ms > 0, "tick interval must be at least 1ms");
    anyhow::ensure!(
        args.speed.is_finite() && args.speed > 0.0,
        "speed must be a positive number, got {}",
        args.speed
    );

    let segments = store.segments(&args.media).await?;
    let Some(end) = segments.iter().map(|s| s.end_time).reduce(f64::max) else {
        println!("no segments for {}", args.media);
        return Ok(ReplayStats::default());
    };

    let mut session = TaggingSession::new(store.clone(), args.media.as_str(), store.config());
    let clock = SimulatedClock::new();
    let step = args.tick_ms as f64 / 1000.0 * args.speed;
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms));
    let mut stats = ReplayStats::default();

    tracing::info!(media_id = %args.media, end, step, "replay_started");
    while clock.position() <= end + step {
        ticker.tick().await;
        let (reading, signals) = session.tick(&clock).await?;
        if !signals.is_empty() {
            hold(&mut session, signals, reading.seconds, args.auto_tag, &mut stats).await?;
        }
        clock.advance(step);
    }
    tracing::info!(media_id = %args.media, ?stats, "replay_finished");
    Ok(stats)
}

/// Playback is held from a pause signal until the segment completes or the
/// simulated user resumes over it.
async fn hold(
    session: &mut TaggingSession,
    mut signals: Vec<TaggingSignal>,
    at: f64,
    auto_tag: bool,
    stats: &mut ReplayStats,
) -> anyhow::Result<()> {
    loop {
        let mut focus = None;
        for signal in &signals {
            match signal {
                TaggingSignal::Pause { segment_id } => {
                    stats.pauses += 1;
                    println!("{at:>8.2}s  pause   {segment_id}");
                    show_held(session).await?;
                }
                TaggingSignal::Resume { segment_id } => {
                    println!("{at:>8.2}s  resume  {segment_id}");
                }
                TaggingSignal::FocusToken { index, .. } => focus = Some(*index),
            }
        }

        if session.state() != TaggingState::AwaitingTag {
            return Ok(());
        }

        let Some(index) = focus.filter(|_| auto_tag) else {
            session.manual_resume();
            stats.overrides += 1;
            println!("{at:>8.2}s  resumed without tagging");
            return Ok(());
        };

        let sense_id = sense_for_token(session, index).await?;
        let (next, pending) = session.tag_token(index, sense_id).await?;
        if let Err(e) = pending.confirmed().await {
            tracing::warn!(index, sense_id, error = %e, "auto_tag_not_persisted");
        }
        stats.tagged += 1;
        signals = next;
    }
}

async fn show_held(session: &TaggingSession) -> anyhow::Result<()> {
    let Some(segment) = session.active_segment().await? else {
        return Ok(());
    };
    let guard = session.guard();
    if let Some(resolved) = guard.run(session.store().resolve_senses(&segment)).await {
        let resolved = resolved?;
        println!("          {}", inspect::render(std::slice::from_ref(&resolved)));
    }
    Ok(())
}

/// First known sense for the focused token's word, or a new placeholder.
async fn sense_for_token(session: &TaggingSession, index: usize) -> anyhow::Result<SenseId> {
    let segment = session
        .active_segment()
        .await?
        .ok_or(Error::NoActiveSegment)?;
    let word = segment
        .tokens()
        .get(index)
        .or_else(|| first_untagged(segment.tokens()).and_then(|i| segment.tokens().get(i)))
        .map(|t| t.text.clone())
        .ok_or(Error::NoActiveSegment)?;

    let store = session.store();
    if let Some(existing) = store.senses_for_word(&word).await?.first() {
        return Ok(existing.id);
    }

    let created = store
        .create_sense(NewSense {
            definition: format!("meaning of {word}"),
            source: Some("replay".into()),
            label: None,
            owner_word: word,
        })
        .await?;
    Ok(created.id)
}
