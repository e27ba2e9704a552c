use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use engine::{BoardState, InvalidReason, Side, Terminal, Termination};
use model::{PolicyRef, PolicyService, SampleRequest, ServiceError, TrainingBatch};
use oracle::{EngineError, Evaluation, Evaluator, SearchBudget};
use self_play::{AbortReason, Decoded, Outcome, RolloutOptions, RolloutPlayer};

struct ScriptedPolicy {
    replies: RefCell<VecDeque<Result<String, ServiceError>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedPolicy {
    fn new(moves: &[&str]) -> Self {
        Self::from_replies(moves.iter().map(|m| Ok(m.to_string())).collect())
    }

    fn from_replies(replies: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }
}

impl PolicyService for ScriptedPolicy {
    async fn sample(&self, _policy: &PolicyRef, request: &SampleRequest) -> Result<String, ServiceError> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Decode("script exhausted".to_string())))
    }

    async fn train(&self, _batch: &TrainingBatch) -> Result<PolicyRef, ServiceError> {
        unimplemented!("rollouts never train")
    }
}

/// Never answers a sample request.
struct SilentPolicy {
    calls: Cell<usize>,
}

impl PolicyService for SilentPolicy {
    async fn sample(&self, _policy: &PolicyRef, _request: &SampleRequest) -> Result<String, ServiceError> {
        self.calls.set(self.calls.get() + 1);
        std::future::pending().await
    }

    async fn train(&self, _batch: &TrainingBatch) -> Result<PolicyRef, ServiceError> {
        unimplemented!("rollouts never train")
    }
}

/// Scores every position 0 and fails the first `failures` calls as a crashed engine.
struct FakeEvaluator {
    failures: Cell<usize>,
    calls: Cell<usize>,
}

impl FakeEvaluator {
    fn new() -> Self {
        Self::failing(0)
    }

    fn failing(failures: usize) -> Self {
        Self {
            failures: Cell::new(failures),
            calls: Cell::new(0),
        }
    }
}

impl Evaluator for FakeEvaluator {
    async fn evaluate(&self, _state: &BoardState, _budget: &SearchBudget) -> Result<Evaluation, EngineError> {
        self.calls.set(self.calls.get() + 1);

        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(EngineError::Exited);
        }

        Ok(Evaluation::from_centipawns(0))
    }
}

fn options() -> RolloutOptions {
    RolloutOptions {
        retry_base_delay_ms: 1,
        ..RolloutOptions::default()
    }
}

fn budget() -> SearchBudget {
    SearchBudget {
        depth: None,
        movetime: Duration::from_millis(10),
        timeout: Duration::from_millis(100),
    }
}

fn policy() -> PolicyRef {
    PolicyRef::base("test".to_string(), "base".to_string())
}

#[tokio::test]
async fn fools_mate_is_a_black_win() {
    let service = ScriptedPolicy::new(&["f2f3", "e7e5", "g2g4", "d8h4"]);
    let evaluator = FakeEvaluator::new();
    let options = options();
    let player = RolloutPlayer::new(&service, &evaluator, &options, budget());

    let trajectory = player.play_rollout(0, &policy(), BoardState::initial(), 1).await;

    assert_eq!(
        trajectory.outcome,
        Outcome::Finished(Terminal::decisive(Side::Black, Termination::Checkmate))
    );
    assert_eq!(trajectory.outcome.tag(), "black_win");
    assert_eq!(trajectory.plies.len(), 4);
    assert_eq!(trajectory.plies[3].side, Side::Black);
    assert_eq!(
        trajectory.plies[3].decoded,
        Decoded::Legal { uci: "d8h4".to_string() }
    );
    // One evaluation for the start position and one per move.
    assert_eq!(evaluator.calls.get(), 5);
}

#[tokio::test]
async fn move_cap_is_a_draw_not_an_abort() {
    let service = ScriptedPolicy::new(&["g1f3", "g8f6", "f3g1", "f6g8", "e2e4"]);
    let evaluator = FakeEvaluator::new();
    let options = RolloutOptions {
        max_plies: 4,
        ..options()
    };
    let player = RolloutPlayer::new(&service, &evaluator, &options, budget());

    let trajectory = player.play_rollout(0, &policy(), BoardState::initial(), 1).await;

    assert_eq!(
        trajectory.outcome,
        Outcome::Finished(Terminal::draw(Termination::MoveCap))
    );
    assert_eq!(trajectory.moves_played(), 4);
}

#[tokio::test]
async fn cap_is_counted_from_the_opening() {
    let service = ScriptedPolicy::new(&["c7c5", "g1f3"]);
    let evaluator = FakeEvaluator::new();
    let options = RolloutOptions {
        max_plies: 2,
        ..options()
    };
    let player = RolloutPlayer::new(&service, &evaluator, &options, budget());
    let opening = BoardState::from_uci_moves(&["e2e4"]).unwrap();

    let trajectory = player.play_rollout(0, &policy(), opening, 1).await;

    assert_eq!(trajectory.opening, vec!["e2e4"]);
    assert_eq!(trajectory.moves_played(), 2);
    assert_eq!(trajectory.plies[0].side, Side::Black);
    assert_eq!(trajectory.outcome.tag(), "draw");
}

#[tokio::test]
async fn knight_shuffle_ends_in_threefold_repetition() {
    let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
    let script = shuffle.iter().chain(shuffle.iter()).copied().collect::<Vec<_>>();
    let service = ScriptedPolicy::new(&script);
    let evaluator = FakeEvaluator::new();
    let options = options();
    let player = RolloutPlayer::new(&service, &evaluator, &options, budget());

    let trajectory = player.play_rollout(0, &policy(), BoardState::initial(), 1).await;

    assert_eq!(
        trajectory.outcome,
        Outcome::Finished(Terminal::draw(Termination::ThreefoldRepetition))
    );
    assert_eq!(trajectory.moves_played(), 8);
}

#[tokio::test]
async fn unparseable_move_is_retried_without_touching_the_board() {
    let service = ScriptedPolicy::new(&["e9e1", "e2e4"]);
    let evaluator = FakeEvaluator::new();
    let options = RolloutOptions {
        max_plies: 1,
        ..options()
    };
    let player = RolloutPlayer::new(&service, &evaluator, &options, budget());
    let initial_fen = BoardState::initial().fen();

    let trajectory = player.play_rollout(0, &policy(), BoardState::initial(), 1).await;

    assert_eq!(trajectory.plies.len(), 2);

    let rejected = &trajectory.plies[0];
    assert_eq!(rejected.attempt, 1);
    assert_eq!(rejected.invalid().map(|i| i.reason), Some(InvalidReason::Unparseable));
    assert_eq!(rejected.eval_after, None);

    let accepted = &trajectory.plies[1];
    assert_eq!(accepted.attempt, 2);
    assert_eq!(accepted.ply, 0);
    assert_eq!(accepted.fen_before, initial_fen);
    assert!(accepted.is_legal());

    let prompts = service.prompts.borrow();
    assert!(!prompts[0].contains("e9e1"));
    assert!(prompts[1].contains("\"e9e1\" (unparseable)"));
    assert_eq!(trajectory.outcome.tag(), "draw");
}

#[tokio::test]
async fn exhausted_attempts_forfeit_the_game() {
    let service = ScriptedPolicy::new(&["hello", "e9e1", "e2e5"]);
    let evaluator = FakeEvaluator::new();
    let options = RolloutOptions {
        invalid_move_retries: 2,
        ..options()
    };
    let player = RolloutPlayer::new(&service, &evaluator, &options, budget());

    let trajectory = player.play_rollout(0, &policy(), BoardState::initial(), 1).await;

    assert_eq!(
        trajectory.outcome,
        Outcome::Finished(Terminal::decisive(Side::Black, Termination::Forfeit))
    );
    assert!(trajectory.is_forfeit());
    assert_eq!(trajectory.invalid_attempts(), 3);
    assert_eq!(trajectory.moves_played(), 0);
    assert_eq!(service.prompts.borrow().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn unreachable_policy_aborts_the_rollout() {
    let unavailable = || {
        Err(ServiceError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    };
    let service = ScriptedPolicy::from_replies(vec![unavailable(), unavailable()]);
    let evaluator = FakeEvaluator::new();
    let options = RolloutOptions {
        sample_retries: 1,
        ..options()
    };
    let player = RolloutPlayer::new(&service, &evaluator, &options, budget());

    let trajectory = player.play_rollout(3, &policy(), BoardState::initial(), 1).await;

    assert!(trajectory.is_aborted());
    assert!(matches!(
        trajectory.outcome,
        Outcome::Aborted(AbortReason::PolicyUnavailable(_))
    ));
    assert_eq!(trajectory.rollout_id, 3);
    assert_eq!(service.prompts.borrow().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn silent_policy_times_out_and_aborts() {
    let service = SilentPolicy { calls: Cell::new(0) };
    let evaluator = FakeEvaluator::new();
    let options = RolloutOptions {
        sample_timeout_ms: 500,
        sample_retries: 2,
        ..options()
    };
    let player = RolloutPlayer::new(&service, &evaluator, &options, budget());

    let started = tokio::time::Instant::now();
    let trajectory = player.play_rollout(5, &policy(), BoardState::initial(), 1).await;

    assert!(matches!(
        trajectory.outcome,
        Outcome::Aborted(AbortReason::PolicyUnavailable(_))
    ));
    assert!(trajectory.plies.is_empty());
    assert_eq!(service.calls.get(), 3);
    assert!(started.elapsed() >= Duration::from_millis(1_500));
}

#[tokio::test(start_paused = true)]
async fn transient_sample_failure_is_retried() {
    let service = ScriptedPolicy::from_replies(vec![
        Err(ServiceError::Timeout),
        Ok("e2e4".to_string()),
    ]);
    let evaluator = FakeEvaluator::new();
    let options = RolloutOptions {
        max_plies: 1,
        ..options()
    };
    let player = RolloutPlayer::new(&service, &evaluator, &options, budget());

    let trajectory = player.play_rollout(0, &policy(), BoardState::initial(), 1).await;

    assert_eq!(trajectory.outcome.tag(), "draw");
    assert_eq!(trajectory.plies.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn crashed_engine_is_retried_then_aborts() {
    let options = RolloutOptions {
        max_plies: 1,
        engine_retries: 1,
        ..options()
    };

    let service = ScriptedPolicy::new(&["e2e4"]);
    let recovering = FakeEvaluator::failing(1);
    let player = RolloutPlayer::new(&service, &recovering, &options, budget());
    let trajectory = player.play_rollout(0, &policy(), BoardState::initial(), 1).await;
    assert!(!trajectory.is_aborted());

    let service = ScriptedPolicy::new(&["e2e4"]);
    let dead = FakeEvaluator::failing(usize::MAX);
    let player = RolloutPlayer::new(&service, &dead, &options, budget());
    let trajectory = player.play_rollout(0, &policy(), BoardState::initial(), 1).await;
    assert!(matches!(
        trajectory.outcome,
        Outcome::Aborted(AbortReason::EngineUnavailable(_))
    ));
    assert_eq!(dead.calls.get(), 2);
}
