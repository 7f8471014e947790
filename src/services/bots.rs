//! Simulated opponents: population policy, naming and per-round answer plans.

use std::{fs, io::ErrorKind, path::Path, time::Duration};

use indexmap::IndexMap;
use rand::{Rng, seq::IndexedRandom};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::{BotProfile, GameConfig},
    services::timer::{Scheduler, TimerEvent, TimerHandle},
    state::game::{GameMode, Player, PlayerId, Question},
};

/// Names used when the bot names file is missing or empty.
const FALLBACK_BOT_NAMES: [&str; 3] = ["BotAlpha", "BotBeta", "BotGamma"];
/// Extra room given to the delay range when a profile's max factor is below its min.
const DELAY_NUDGE_SECS: f64 = 0.1;

/// Read bot display names, one per line, falling back to a small built-in list.
pub fn load_bot_names(path: &Path) -> Vec<String> {
    let names: Vec<String> = match fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "bot names file not found; using built-in names");
            Vec::new()
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read bot names; using built-in names");
            Vec::new()
        }
    };

    if names.is_empty() {
        FALLBACK_BOT_NAMES.iter().map(|name| name.to_string()).collect()
    } else {
        names
    }
}

/// Number of bots to add for `humans` players, given an already drawn `roll` in `[min_bots, max_bots]`.
pub fn bot_count_for(mode: GameMode, humans: usize, roll: usize, config: &GameConfig) -> usize {
    match mode {
        GameMode::Classic if humans == 1 => roll,
        GameMode::Classic => 0,
        GameMode::BattleRoyale if humans == 0 || humans >= config.br_min_total_entities => 0,
        GameMode::BattleRoyale => {
            let needed = config.br_min_total_entities - humans;
            if roll < needed {
                needed.min(config.max_bots)
            } else {
                roll.min(config.max_bots)
            }
        }
    }
}

/// Draw the bot roll and apply the population policy for a new game.
pub fn bots_to_add<R: Rng + ?Sized>(
    mode: GameMode,
    humans: usize,
    config: &GameConfig,
    rng: &mut R,
) -> usize {
    let roll = rng.random_range(config.min_bots..=config.max_bots);
    bot_count_for(mode, humans, roll, config)
}

/// Create `count` bot players with distinct names drawn from `names`.
pub fn create_bots<R: Rng + ?Sized>(count: usize, names: &[String], rng: &mut R) -> Vec<Player> {
    let picked: Vec<String> = if names.is_empty() {
        (1..=count).map(|index| format!("GenericBot_{index}")).collect()
    } else {
        names
            .choose_multiple(rng, count.min(names.len()))
            .cloned()
            .collect()
    };

    (0..count)
        .map(|index| {
            let name = picked.get(index).cloned().unwrap_or_else(|| {
                format!("FallbackBot{}_{}", index + 1, rng.random_range(100..=999))
            });
            Player::bot(format!("bot_{}", Uuid::new_v4()), name)
        })
        .collect()
}

/// Uniform answer delay for `profile` within a question of length `duration`.
pub fn sample_delay<R: Rng + ?Sized>(
    profile: &BotProfile,
    duration: Duration,
    rng: &mut R,
) -> Duration {
    let seconds = duration.as_secs_f64();
    let min = (seconds * profile.min_delay_factor).max(0.0);
    let mut max = seconds * profile.max_delay_factor;
    if max < min {
        max = min + DELAY_NUDGE_SECS;
    }
    Duration::from_secs_f64(rng.random_range(min..=max))
}

/// Everything needed to resolve one bot's answer for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct BotRoundPlan {
    /// Probability of answering correctly.
    pub accuracy: f64,
    /// Question snapshot the bot answers.
    pub question: Question,
    /// Planned answer time, also used to compute points.
    pub delay: Duration,
    resolved: bool,
}

impl BotRoundPlan {
    /// Whether the plan already produced its answer.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

/// Outcome of resolving a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotAnswer {
    /// Option picked, if the question had any to pick from.
    pub choice: Option<String>,
    /// Whether the pick scores.
    pub correct: bool,
    /// Points earned, zero when incorrect.
    pub points: u32,
    /// Resolved at reveal rather than by its own timer.
    pub forced: bool,
}

/// Resolve a plan; forced and natural resolution share the same draw sequence.
pub fn resolve_plan<R, F>(plan: &BotRoundPlan, forced: bool, rng: &mut R, points: F) -> BotAnswer
where
    R: Rng + ?Sized,
    F: Fn(Duration) -> u32,
{
    let correct = rng.random::<f64>() < plan.accuracy;
    let choice = if correct {
        Some(plan.question.correct_answer.clone())
    } else {
        plan.question
            .wrong_options()
            .choose(rng)
            .map(|option| (*option).clone())
    };

    BotAnswer {
        choice,
        correct,
        points: if correct { points(plan.delay) } else { 0 },
        forced,
    }
}

/// Per-round bot plans and their timers.
#[derive(Debug, Default)]
pub struct BotScheduler {
    plans: IndexMap<PlayerId, BotRoundPlan>,
    timers: IndexMap<PlayerId, TimerHandle>,
}

impl BotScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan a bot's answer for the open round and arm its timer.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule_bot_answer<R: Rng + ?Sized>(
        &mut self,
        scheduler: &dyn Scheduler,
        game_id: Uuid,
        round: usize,
        bot_id: &PlayerId,
        question: &Question,
        profile: &BotProfile,
        duration: Duration,
        rng: &mut R,
    ) -> Duration {
        let delay = sample_delay(profile, duration, rng);
        self.plans.insert(
            bot_id.clone(),
            BotRoundPlan {
                accuracy: profile.accuracy,
                question: question.clone(),
                delay,
                resolved: false,
            },
        );

        let timer = scheduler.schedule(
            delay,
            TimerEvent::BotAnswerDue {
                game_id,
                round,
                bot_id: bot_id.clone(),
            },
        );
        if let Some(mut previous) = self.timers.insert(bot_id.clone(), timer) {
            previous.cancel();
        }
        debug!(bot = %bot_id, round, delay_ms = delay.as_millis() as u64, "bot answer scheduled");
        delay
    }

    /// Plan of a bot for the open round.
    pub fn plan(&self, bot_id: &str) -> Option<&BotRoundPlan> {
        self.plans.get(bot_id)
    }

    /// Resolve one bot. Returns `None` when it has no plan or already resolved.
    pub fn resolve<R, F>(&mut self, bot_id: &str, rng: &mut R, points: F) -> Option<BotAnswer>
    where
        R: Rng + ?Sized,
        F: Fn(Duration) -> u32,
    {
        self.resolve_one(bot_id, false, rng, &points)
    }

    /// Resolve every pending plan immediately, cancelling their timers.
    pub fn force_pending<R, F>(&mut self, rng: &mut R, points: F) -> Vec<(PlayerId, BotAnswer)>
    where
        R: Rng + ?Sized,
        F: Fn(Duration) -> u32,
    {
        let pending: Vec<PlayerId> = self
            .plans
            .iter()
            .filter(|(_, plan)| !plan.resolved)
            .map(|(bot_id, _)| bot_id.clone())
            .collect();

        pending
            .into_iter()
            .filter_map(|bot_id| {
                self.resolve_one(&bot_id, true, rng, &points)
                    .map(|answer| (bot_id, answer))
            })
            .collect()
    }

    /// Number of plans not yet resolved.
    pub fn pending_count(&self) -> usize {
        self.plans.values().filter(|plan| !plan.resolved).count()
    }

    /// Cancel every timer and drop every plan.
    pub fn clear(&mut self) {
        for (_, mut timer) in self.timers.drain(..) {
            timer.cancel();
        }
        self.plans.clear();
    }

    fn resolve_one<R, F>(
        &mut self,
        bot_id: &str,
        forced: bool,
        rng: &mut R,
        points: &F,
    ) -> Option<BotAnswer>
    where
        R: Rng + ?Sized,
        F: Fn(Duration) -> u32,
    {
        let plan = self.plans.get_mut(bot_id)?;
        if plan.resolved {
            return None;
        }
        plan.resolved = true;
        if let Some(mut timer) = self.timers.shift_remove(bot_id) {
            timer.cancel();
        }
        Some(resolve_plan(plan, forced, rng, points))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::services::testing::ManualScheduler;

    fn question() -> Question {
        Question {
            text: "2 + 2?".into(),
            options: vec!["3".into(), "4".into(), "5".into(), "22".into()],
            correct_answer: "4".into(),
            difficulty: 1,
        }
    }

    fn plan(accuracy: f64, delay: Duration) -> BotRoundPlan {
        BotRoundPlan {
            accuracy,
            question: question(),
            delay,
            resolved: false,
        }
    }

    fn points(config: &GameConfig) -> impl Fn(Duration) -> u32 + '_ {
        move |delay| config.points_for(delay)
    }

    #[test]
    fn classic_solo_player_gets_the_roll() {
        let config = GameConfig::default();
        assert_eq!(bot_count_for(GameMode::Classic, 1, 7, &config), 7);
        assert_eq!(bot_count_for(GameMode::Classic, 2, 7, &config), 0);
    }

    #[test]
    fn battle_royale_tops_up_only_when_the_roll_is_short() {
        let config = GameConfig {
            min_bots: 0,
            max_bots: 5,
            br_min_total_entities: 3,
            ..GameConfig::default()
        };
        assert_eq!(bot_count_for(GameMode::BattleRoyale, 2, 0, &config), 1);
        assert_eq!(bot_count_for(GameMode::BattleRoyale, 2, 4, &config), 4);
        assert_eq!(bot_count_for(GameMode::BattleRoyale, 2, 9, &config), 5);
        assert_eq!(bot_count_for(GameMode::BattleRoyale, 3, 4, &config), 0);
    }

    #[test]
    fn classic_bot_count_stays_in_range() {
        let config = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let count = bots_to_add(GameMode::Classic, 1, &config, &mut rng);
            assert!((config.min_bots..=config.max_bots).contains(&count));
        }
    }

    #[test]
    fn bots_get_distinct_names_and_fallbacks() {
        let mut rng = StdRng::seed_from_u64(2);
        let names = vec!["Ada".to_string(), "Bob".to_string()];
        let bots = create_bots(4, &names, &mut rng);

        assert_eq!(bots.len(), 4);
        assert!(bots.iter().all(|bot| bot.is_bot && bot.id.starts_with("bot_")));
        assert_ne!(bots[0].name, bots[1].name);
        assert!(bots[2].name.starts_with("FallbackBot3_"));
        assert!(bots[3].name.starts_with("FallbackBot4_"));

        let generic = create_bots(2, &[], &mut rng);
        assert_eq!(generic[0].name, "GenericBot_1");
        assert_eq!(generic[1].name, "GenericBot_2");
    }

    #[test]
    fn inverted_delay_range_is_nudged() {
        let profile = BotProfile {
            accuracy: 0.5,
            min_delay_factor: 0.5,
            max_delay_factor: 0.2,
        };
        let mut rng = StdRng::seed_from_u64(9);
        let delay = sample_delay(&profile, Duration::from_secs(20), &mut rng);
        assert!(delay >= Duration::from_secs(10));
        assert!(delay <= Duration::from_secs_f64(10.1));
    }

    #[test]
    fn wrong_answers_never_pick_the_correct_option() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let answer = resolve_plan(&plan(0.0, Duration::from_secs(1)), false, &mut rng, |_| 10);
            assert!(!answer.correct);
            assert_eq!(answer.points, 0);
            assert_ne!(answer.choice.as_deref(), Some("4"));
        }
    }

    #[test]
    fn forced_resolution_matches_natural_resolution() {
        let config = GameConfig::default();
        let delay = Duration::from_secs(6);

        let natural = resolve_plan(
            &plan(0.7, delay),
            false,
            &mut StdRng::seed_from_u64(42),
            points(&config),
        );
        let forced = resolve_plan(
            &plan(0.7, delay),
            true,
            &mut StdRng::seed_from_u64(42),
            points(&config),
        );

        assert_eq!(natural.correct, forced.correct);
        assert_eq!(natural.choice, forced.choice);
        assert_eq!(natural.points, forced.points);
        if natural.correct {
            assert_eq!(natural.points, 700);
        }
    }

    #[test]
    fn resolution_is_idempotent_and_cancels_the_timer() {
        let config = GameConfig::default();
        let scheduler = ManualScheduler::default();
        let mut bots = BotScheduler::new();
        let mut rng = StdRng::seed_from_u64(5);
        let bot_id = "bot_a".to_string();
        let profile = config.bot_profile("expert");

        bots.schedule_bot_answer(
            &scheduler,
            Uuid::new_v4(),
            1,
            &bot_id,
            &question(),
            &profile,
            config.question_duration,
            &mut rng,
        );
        assert_eq!(scheduler.pending().len(), 1);

        assert!(bots.plan(&bot_id).is_some_and(|plan| !plan.is_resolved()));
        assert!(bots.resolve(&bot_id, &mut rng, points(&config)).is_some());
        assert!(bots.plan(&bot_id).is_some_and(BotRoundPlan::is_resolved));
        assert!(bots.resolve(&bot_id, &mut rng, points(&config)).is_none());
        assert!(bots.force_pending(&mut rng, points(&config)).is_empty());
        assert!(scheduler.pending().is_empty());
    }

    #[test]
    fn force_pending_resolves_only_unresolved_plans() {
        let config = GameConfig::default();
        let scheduler = ManualScheduler::default();
        let mut bots = BotScheduler::new();
        let mut rng = StdRng::seed_from_u64(8);
        let profile = config.bot_profile("easy");
        let game_id = Uuid::new_v4();
        for bot in ["bot_a", "bot_b", "bot_c"] {
            bots.schedule_bot_answer(
                &scheduler,
                game_id,
                2,
                &bot.to_string(),
                &question(),
                &profile,
                config.question_duration,
                &mut rng,
            );
        }
        bots.resolve("bot_b", &mut rng, points(&config));

        let forced = bots.force_pending(&mut rng, points(&config));
        let ids: Vec<&str> = forced.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["bot_a", "bot_c"]);
        assert!(forced.iter().all(|(_, answer)| answer.forced));
        assert_eq!(bots.pending_count(), 0);
        assert!(scheduler.pending().is_empty());
    }

    #[test]
    fn clear_cancels_all_timers() {
        let config = GameConfig::default();
        let scheduler = ManualScheduler::default();
        let mut bots = BotScheduler::new();
        let mut rng = StdRng::seed_from_u64(3);
        let profile = config.bot_profile("advanced");
        bots.schedule_bot_answer(
            &scheduler,
            Uuid::new_v4(),
            1,
            &"bot_x".to_string(),
            &question(),
            &profile,
            config.question_duration,
            &mut rng,
        );

        bots.clear();
        assert!(scheduler.pending().is_empty());
        assert!(bots.plan("bot_x").is_none());
    }

    #[test]
    fn missing_names_file_uses_built_in_names() {
        let names = load_bot_names(Path::new("does/not/exist.txt"));
        assert_eq!(names, ["BotAlpha", "BotBeta", "BotGamma"]);
    }

    #[test]
    fn names_file_skips_blank_lines() {
        let path = std::env::temp_dir().join(format!("bot_names_{}.txt", Uuid::new_v4().simple()));
        fs::write(&path, "Ada\n\n  Turing  \n").unwrap();
        let names = load_bot_names(&path);
        fs::remove_file(&path).unwrap();
        assert_eq!(names, ["Ada", "Turing"]);
    }
}
