//! Search output formatting: info lines, score normalization and the
//! win/draw/loss model.
//!
//! Reported centipawns are normalized so that +1.00 corresponds to a
//! 50% win rate around move 32; the WDL numbers come from a logistic
//! model whose parameters drift with the game ply, fitted on the
//! engine's own games.

use crate::board::Move;
use crate::search::{is_mate_score, moves_to_mate, SearchReport};

/// Cubic coefficients (highest power first) of the 50%-win anchor `a`
const WIN_ANCHOR: [f64; 4] = [-1.16, 8.65, -18.70, 143.90];

/// Cubic coefficients of the logistic spread `b`
const WIN_SPREAD: [f64; 4] = [-4.63, 28.00, -57.00, 92.00];

fn poly(coefficients: &[f64; 4], x: f64) -> f64 {
    ((coefficients[0] * x + coefficients[1]) * x + coefficients[2]) * x + coefficients[3]
}

fn model_params(ply: usize) -> (f64, f64) {
    let m = (ply.min(240) as f64) / 64.0;
    (poly(&WIN_ANCHOR, m), poly(&WIN_SPREAD, m))
}

/// Normalize an internal score for display: 100 reported centipawns are
/// one "50% win" unit at the given game ply. Mate scores pass through.
#[must_use]
pub fn to_centipawns(score: i32, ply: usize) -> i32 {
    if is_mate_score(score) {
        return score;
    }
    let (anchor, _) = model_params(ply);
    (f64::from(score) * 100.0 / anchor).round() as i32
}

/// Win/draw/loss expectation in permille for the side to move
#[must_use]
pub fn wdl_model(score: i32, ply: usize) -> (u32, u32, u32) {
    let (anchor, spread) = model_params(ply);
    let s = f64::from(score.clamp(-4000, 4000));
    let win = 1000.0 / (1.0 + ((anchor - s) / spread).exp());
    let loss = 1000.0 / (1.0 + ((anchor + s) / spread).exp());
    let win = win.round() as u32;
    let loss = loss.round() as u32;
    let draw = 1000u32.saturating_sub(win + loss);
    (win, draw, loss)
}

/// Format one iteration's `info` line
#[must_use]
pub fn format_info(report: &SearchReport, chess960: bool, show_wdl: bool) -> String {
    let score = if is_mate_score(report.score) {
        format!("mate {}", moves_to_mate(report.score))
    } else {
        format!("cp {}", to_centipawns(report.score, report.root_ply))
    };

    let wdl = if show_wdl {
        let (w, d, l) = wdl_model(report.score, report.root_ply);
        format!(" wdl {w} {d} {l}")
    } else {
        String::new()
    };

    let pv = report
        .pv
        .iter()
        .map(|m| m.uci(chess960))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "info depth {} seldepth {} score {}{} nodes {} nps {} time {} hashfull {} pv {}",
        report.depth,
        report.seldepth,
        score,
        wdl,
        report.nodes,
        report.nps,
        report.time_ms,
        report.hashfull,
        pv
    )
}

/// Format the final `bestmove` line
#[must_use]
pub fn format_bestmove(best: Option<Move>, chess960: bool) -> String {
    match best {
        Some(m) => format!("bestmove {}", m.uci(chess960)),
        None => "bestmove 0000".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Square;
    use crate::search::MATE;

    #[test]
    fn test_wdl_is_balanced_at_zero() {
        let (w, d, l) = wdl_model(0, 64);
        assert_eq!(w, l);
        assert_eq!(w + d + l, 1000);
        assert!(d > 500, "draw share at 0.00 should dominate, got {d}");
    }

    #[test]
    fn test_wdl_anchor_is_half() {
        // At the anchor score the model puts the win chance at 50%
        let (anchor, _) = model_params(64);
        let (w, _, _) = wdl_model(anchor.round() as i32, 64);
        assert!((499..=501).contains(&w), "w={w}");
    }

    #[test]
    fn test_wdl_monotone_in_score() {
        let mut last_w = 0;
        for score in [-400, -100, 0, 100, 400, 900] {
            let (w, _, _) = wdl_model(score, 64);
            assert!(w >= last_w);
            last_w = w;
        }
    }

    #[test]
    fn test_to_centipawns_anchor() {
        let (anchor, _) = model_params(64);
        assert_eq!(to_centipawns(anchor.round() as i32, 64), 100);
        assert_eq!(to_centipawns(0, 64), 0);
        // Mate scores are not normalized
        assert_eq!(to_centipawns(MATE - 5, 64), MATE - 5);
    }

    #[test]
    fn test_format_info_line() {
        let report = SearchReport {
            depth: 10,
            seldepth: 17,
            score: 35,
            nodes: 123_456,
            nps: 1_000_000,
            time_ms: 123,
            hashfull: 42,
            pv: vec![
                Move::new(Square::new(1, 4), Square::new(3, 4)),
                Move::new(Square::new(6, 4), Square::new(4, 4)),
            ],
            root_ply: 0,
        };
        let line = format_info(&report, false, false);
        assert!(line.starts_with("info depth 10 seldepth 17 score cp "));
        assert!(line.contains("nodes 123456 nps 1000000 time 123 hashfull 42 pv e2e4 e7e5"));
        assert!(!line.contains("wdl"));

        let with_wdl = format_info(&report, false, true);
        assert!(with_wdl.contains(" wdl "));
    }

    #[test]
    fn test_format_info_mate_score() {
        let report = SearchReport {
            depth: 6,
            seldepth: 6,
            score: MATE - 3,
            nodes: 10,
            nps: 10,
            time_ms: 1,
            hashfull: 0,
            pv: vec![Move::new(Square::E1, Square::E8)],
            root_ply: 0,
        };
        let line = format_info(&report, false, false);
        assert!(line.contains("score mate 2"), "line: {line}");
    }

    #[test]
    fn test_format_bestmove() {
        let castle = Move::short_castle(Square::E1, Square::H1);
        assert_eq!(format_bestmove(Some(castle), false), "bestmove e1g1");
        assert_eq!(format_bestmove(Some(castle), true), "bestmove e1h1");
        assert_eq!(format_bestmove(None, false), "bestmove 0000");
    }
}
