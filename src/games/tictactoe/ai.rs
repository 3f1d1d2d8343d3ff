//! Minimax opponent with alpha-beta pruning.
//!
//! The opponent is intentionally beatable: with probability
//! [`AiPlayer::optimal_move_probability`] it plays the searched move, otherwise
//! a uniformly random legal move.

use super::rules::{check_winner, is_full};
use super::{Board, Cell, Mark};
use derive_getters::Getters;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, instrument};

/// Default chance of playing the minimax move.
pub const DEFAULT_OPTIMAL_MOVE_PROBABILITY: f64 = 0.7;

/// Default search horizon in plies.
pub const DEFAULT_MAX_DEPTH: u8 = 6;

const WIN_SCORE: i32 = 10;

/// Computer opponent configuration.
#[derive(Debug, Clone, Copy, PartialEq, Getters)]
pub struct AiPlayer {
    optimal_move_probability: f64,
    max_depth: u8,
}

impl Default for AiPlayer {
    fn default() -> Self {
        Self {
            optimal_move_probability: DEFAULT_OPTIMAL_MOVE_PROBABILITY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl AiPlayer {
    /// Creates an opponent; the probability is clamped to `0.0..=1.0`.
    pub fn new(optimal_move_probability: f64, max_depth: u8) -> Self {
        Self {
            optimal_move_probability: optimal_move_probability.clamp(0.0, 1.0),
            max_depth,
        }
    }

    /// Picks a move using the thread-local RNG.
    ///
    /// Returns `None` when the board has no empty cell.
    pub fn choose_move(&self, board: &Board, ai_mark: Mark) -> Option<usize> {
        self.choose_move_with(board, ai_mark, &mut rand::thread_rng())
    }

    /// Picks a move using the supplied RNG.
    #[instrument(skip(self, board, rng), fields(ai_mark = %ai_mark))]
    pub fn choose_move_with<R: Rng + ?Sized>(
        &self,
        board: &Board,
        ai_mark: Mark,
        rng: &mut R,
    ) -> Option<usize> {
        let available = board.empty_positions();
        if available.is_empty() {
            return None;
        }

        if rng.gen_bool(self.optimal_move_probability) {
            let position = self.best_move(board, ai_mark);
            debug!(?position, "Playing searched move");
            position
        } else {
            let position = available.choose(rng).copied();
            debug!(?position, "Playing random move");
            position
        }
    }

    /// The minimax-optimal move; ties go to the lowest position.
    #[instrument(skip(self, board), fields(ai_mark = %ai_mark))]
    pub fn best_move(&self, board: &Board, ai_mark: Mark) -> Option<usize> {
        let mut scratch = *board;
        let mut best: Option<(usize, i32)> = None;

        for position in board.empty_positions() {
            scratch.cells_mut()[position] = Cell::from(ai_mark);
            let score = self.minimax(&mut scratch, 0, false, ai_mark, i32::MIN, i32::MAX);
            scratch.cells_mut()[position] = Cell::Empty;

            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((position, score));
            }
        }

        best.map(|(position, _)| position)
    }

    fn minimax(
        &self,
        board: &mut Board,
        depth: u8,
        maximizing: bool,
        ai_mark: Mark,
        mut alpha: i32,
        mut beta: i32,
    ) -> i32 {
        if let Some(win) = check_winner(board) {
            let depth = i32::from(depth);
            return if win.mark == ai_mark {
                WIN_SCORE - depth
            } else {
                depth - WIN_SCORE
            };
        }
        if is_full(board) || depth >= self.max_depth {
            return 0;
        }

        let mover = if maximizing { ai_mark } else { ai_mark.opponent() };
        let mut best = if maximizing { i32::MIN } else { i32::MAX };

        for position in board.empty_positions() {
            board.cells_mut()[position] = Cell::from(mover);
            let score = self.minimax(board, depth + 1, !maximizing, ai_mark, alpha, beta);
            board.cells_mut()[position] = Cell::Empty;

            if maximizing {
                best = best.max(score);
                alpha = alpha.max(score);
            } else {
                best = best.min(score);
                beta = beta.min(score);
            }
            if beta <= alpha {
                break;
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn board(cells: [Cell; 9]) -> Board {
        Board::from_cells(cells)
    }

    #[test]
    fn test_takes_immediate_win_over_block() {
        use Cell::{Empty as E, O, X};
        // X X _ / O O _ / _ _ X : O wins at 5, blocking at 2 only delays.
        let board = board([X, X, E, O, O, E, E, E, X]);
        assert_eq!(AiPlayer::default().best_move(&board, Mark::O), Some(5));
    }

    #[test]
    fn test_blocks_opponent_line() {
        use Cell::{Empty as E, O, X};
        // X X _ / _ O _ / _ _ _ : O must block at 2.
        let board = board([X, X, E, E, O, E, E, E, E]);
        assert_eq!(AiPlayer::default().best_move(&board, Mark::O), Some(2));
    }

    #[test]
    fn test_full_board_has_no_move() {
        use Cell::{O, X};
        let board = board([X, O, X, O, X, X, O, X, O]);
        let ai = AiPlayer::default();
        assert_eq!(ai.best_move(&board, Mark::O), None);
        assert_eq!(ai.choose_move(&board, Mark::O), None);
    }

    #[test]
    fn test_search_leaves_board_untouched() {
        use Cell::{Empty as E, O, X};
        let original = board([X, E, E, E, O, E, E, E, X]);
        let copy = original;
        let _ = AiPlayer::default().best_move(&original, Mark::O);
        assert_eq!(original, copy);
    }

    #[test]
    fn test_optimal_bias_is_roughly_seventy_percent() {
        use Cell::{Empty as E, O, X};
        let board = board([X, X, E, O, O, E, E, E, X]);
        let ai = AiPlayer::default();
        let optimal = ai.best_move(&board, Mark::O).unwrap();
        let mut rng = StdRng::seed_from_u64(0x7ac7);

        let mut optimal_hits = 0;
        for _ in 0..1000 {
            let mv = ai.choose_move_with(&board, Mark::O, &mut rng).unwrap();
            assert!(board.is_empty(mv), "AI picked occupied cell {mv}");
            if mv == optimal {
                optimal_hits += 1;
            }
        }
        assert!(optimal_hits >= 650, "only {optimal_hits} optimal picks");
    }

    #[test]
    fn test_always_random_never_plays_occupied() {
        use Cell::{Empty as E, O, X};
        let board = board([X, O, E, E, X, E, O, E, E]);
        let ai = AiPlayer::new(0.0, DEFAULT_MAX_DEPTH);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let mv = ai.choose_move_with(&board, Mark::X, &mut rng).unwrap();
            assert!(board.is_empty(mv));
        }
    }

    #[test]
    fn test_probability_is_clamped() {
        assert_eq!(*AiPlayer::new(1.5, 6).optimal_move_probability(), 1.0);
        assert_eq!(*AiPlayer::new(-0.2, 6).optimal_move_probability(), 0.0);
    }
}
