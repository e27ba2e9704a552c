use common::create_rng_from_seed;
use engine::InvalidReason;
use model::{PolicyRef, TrainingBatch, TrainingExample};
use rand::seq::SliceRandom;

use super::{ScoredPly, ScoredTrajectory};

#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Whether non-empty invalid completions are trained on with their penalty.
    pub train_on_invalid: bool,
    pub normalize_returns: bool,
    pub shuffle_examples: bool,
    pub seed: u64,
}

/// Flattens a round of scored rollouts into training examples, ordered by rollout id then by ply. Empty
/// completions never become examples. Shuffling, when enabled, is seeded by the iteration so a batch can be
/// rebuilt exactly.
pub fn build_batch(
    iteration: usize,
    policy: &PolicyRef,
    trajectories: &[ScoredTrajectory],
    options: &BatchOptions,
) -> TrainingBatch {
    let mut ordered = trajectories.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|t| t.rollout_id);

    let mut examples = ordered
        .into_iter()
        .flat_map(|t| t.plies.iter())
        .filter(|p| is_trainable(p, options))
        .map(|p| TrainingExample {
            prompt: p.record.prompt.clone(),
            completion: p.record.completion.clone(),
            weight: p.return_value,
        })
        .collect::<Vec<_>>();

    if options.normalize_returns && !examples.is_empty() {
        let mean = examples.iter().map(|e| e.weight).sum::<f32>() / examples.len() as f32;
        for example in &mut examples {
            example.weight -= mean;
        }
    }

    if options.shuffle_examples {
        let mut rng = create_rng_from_seed(options.seed, &[iteration as u64]);
        examples.shuffle(&mut rng);
    }

    TrainingBatch {
        iteration,
        policy: policy.clone(),
        examples,
    }
}

fn is_trainable(ply: &ScoredPly, options: &BatchOptions) -> bool {
    match ply.record.invalid() {
        None => true,
        Some(invalid) if invalid.reason == InvalidReason::Empty => false,
        Some(_) => options.train_on_invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use engine::{InvalidMove, Side, Terminal, Termination};
    use oracle::Evaluation;
    use self_play::{Decoded, PlyRecord};

    fn ply(completion: &str, decoded: Decoded, return_value: f32) -> ScoredPly {
        ScoredPly {
            record: PlyRecord {
                ply: 0,
                side: Side::White,
                fen_before: String::new(),
                prompt: format!("prompt for {}", completion),
                completion: completion.to_string(),
                decoded,
                attempt: 1,
                eval_before: Evaluation::from_centipawns(0),
                eval_after: None,
            },
            shaping: 0.0,
            terminal_reward: 0.0,
            return_value,
        }
    }

    fn legal(uci: &str, return_value: f32) -> ScoredPly {
        ply(uci, Decoded::Legal { uci: uci.to_string() }, return_value)
    }

    fn invalid(text: &str, reason: InvalidReason) -> ScoredPly {
        ply(
            text,
            Decoded::Invalid(InvalidMove {
                reason,
                text: text.to_string(),
            }),
            -1.0,
        )
    }

    fn scored(rollout_id: usize, plies: Vec<ScoredPly>) -> ScoredTrajectory {
        ScoredTrajectory {
            rollout_id,
            policy: policy(),
            opening: Vec::new(),
            terminal: Terminal::draw(Termination::MoveCap),
            plies,
            degraded_evaluations: 0,
        }
    }

    fn policy() -> PolicyRef {
        PolicyRef::base("run".to_string(), "base".to_string())
    }

    fn options() -> BatchOptions {
        BatchOptions {
            train_on_invalid: true,
            normalize_returns: false,
            shuffle_examples: false,
            seed: 0,
        }
    }

    fn completions(batch: &TrainingBatch) -> Vec<&str> {
        batch.examples.iter().map(|e| e.completion.as_str()).collect()
    }

    #[test]
    fn test_examples_are_ordered_by_rollout() {
        let rounds = vec![
            scored(1, vec![legal("d2d4", 0.2), legal("d7d5", 0.1)]),
            scored(0, vec![legal("e2e4", 0.5)]),
        ];

        let batch = build_batch(3, &policy(), &rounds, &options());

        assert_eq!(batch.iteration, 3);
        assert_eq!(completions(&batch), vec!["e2e4", "d2d4", "d7d5"]);
        assert_approx_eq!(batch.examples[0].weight, 0.5);
        assert_eq!(batch.examples[0].prompt, "prompt for e2e4");
    }

    #[test]
    fn test_empty_completions_are_always_excluded() {
        let rounds = vec![scored(
            0,
            vec![
                invalid("   ", InvalidReason::Empty),
                invalid("Ke9", InvalidReason::Unparseable),
                legal("e2e4", 0.5),
            ],
        )];

        let with_invalid = build_batch(1, &policy(), &rounds, &options());
        let without_invalid = build_batch(
            1,
            &policy(),
            &rounds,
            &BatchOptions {
                train_on_invalid: false,
                ..options()
            },
        );

        assert_eq!(completions(&with_invalid), vec!["Ke9", "e2e4"]);
        assert_approx_eq!(with_invalid.examples[0].weight, -1.0);
        assert_eq!(completions(&without_invalid), vec!["e2e4"]);
    }

    #[test]
    fn test_returns_are_mean_centered() {
        let rounds = vec![scored(0, vec![legal("e2e4", 1.0), legal("e7e5", 0.0)])];
        let options = BatchOptions {
            normalize_returns: true,
            ..options()
        };

        let batch = build_batch(1, &policy(), &rounds, &options);

        assert_approx_eq!(batch.examples[0].weight, 0.5);
        assert_approx_eq!(batch.examples[1].weight, -0.5);
    }

    #[test]
    fn test_shuffle_is_reproducible() {
        let plies = ["a2a3", "b2b3", "c2c3", "d2d3", "e2e3", "f2f3", "g2g3", "h2h3"]
            .iter()
            .map(|uci| legal(uci, 0.0))
            .collect();
        let rounds = vec![scored(0, plies)];
        let options = BatchOptions {
            shuffle_examples: true,
            seed: 11,
            ..options()
        };

        let first = build_batch(2, &policy(), &rounds, &options);
        let second = build_batch(2, &policy(), &rounds, &options);

        assert_eq!(completions(&first), completions(&second));
        assert_eq!(first.len(), 8);
    }
}
