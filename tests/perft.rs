//! Perft: move generation correctness over known positions.

use vanguard::board::{MoveGen, Position};

struct TestPosition {
    name: &'static str,
    fen: &'static str,
    depths: &'static [(usize, u64)],
}

const TEST_POSITIONS: &[TestPosition] = &[
    TestPosition {
        name: "Initial position",
        fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        depths: &[(1, 20), (2, 400), (3, 8902), (4, 197_281), (5, 4_865_609)],
    },
    TestPosition {
        name: "Kiwipete",
        fen: "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        depths: &[(1, 48), (2, 2039), (3, 97_862), (4, 4_085_603)],
    },
    TestPosition {
        name: "Position 3 (en passant pin themes)",
        fen: "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        depths: &[(1, 14), (2, 191), (3, 2812), (4, 43_238), (5, 674_624)],
    },
    TestPosition {
        name: "Position 4 (promotions)",
        fen: "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        depths: &[(1, 6), (2, 264), (3, 9467), (4, 422_333)],
    },
    TestPosition {
        name: "Position 5",
        fen: "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        depths: &[(1, 44), (2, 1486), (3, 62_379), (4, 2_103_487)],
    },
    TestPosition {
        name: "Position 6",
        fen: "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
        depths: &[(1, 46), (2, 2079), (3, 89_890)],
    },
    TestPosition {
        name: "En passant capture",
        fen: "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3",
        depths: &[(1, 31), (2, 707), (3, 21_637)],
    },
    TestPosition {
        name: "Underpromotions",
        fen: "n1n5/PPPk4/8/8/8/8/4Kppp/5N1N b - - 0 1",
        depths: &[(1, 24), (2, 496), (3, 9483)],
    },
    TestPosition {
        name: "Castling",
        fen: "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1",
        depths: &[(1, 26), (2, 568), (3, 13_744)],
    },
];

#[test]
fn test_standard_perft_positions() {
    for position in TEST_POSITIONS {
        let mut pos = Position::from_fen(position.fen, false).expect("valid test fen");
        for &(depth, expected) in position.depths {
            let nodes = pos.perft(depth);
            assert_eq!(
                nodes, expected,
                "{} at depth {depth}: expected {expected}, got {nodes}",
                position.name
            );
        }
    }
}

#[test]
#[ignore = "slow; run with cargo test -- --ignored"]
fn test_startpos_perft_6() {
    let mut pos = Position::new();
    assert_eq!(pos.perft(6), 119_060_324);
}

#[test]
#[ignore = "slow; run with cargo test -- --ignored"]
fn test_kiwipete_perft_5() {
    let mut pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        false,
    )
    .unwrap();
    assert_eq!(pos.perft(5), 193_690_690);
}

/// Scharnagl index 518 is the classical arrangement; searching it through
/// the Chess960 machinery (king-takes-rook castling included) must count
/// exactly the classical tree
#[test]
fn test_frc_classical_layout_matches_standard_perft() {
    let mut frc = Position::from_frc(518, 518);
    let mut classical = Position::new();
    for depth in 1..=5 {
        assert_eq!(frc.perft(depth), classical.perft(depth), "depth {depth}");
    }
}

#[test]
fn test_frc_midgame_position() {
    let pos = Position::from_fen(
        "1rqbkrbn/1ppppp1p/1n6/p1N3p1/8/2P4P/PP1PPPP1/1RQBKRBN w FBfb - 0 9",
        true,
    )
    .unwrap();
    // Both castling paths are blocked here; 29 legal moves in total
    let moves = pos.generate_legal_moves();
    assert_eq!(moves.len(), 29);
    assert!(moves.iter().all(|m| !m.is_castling()));
}

#[test]
fn test_dfrc_startpos_castles_king_takes_rook() {
    let pos = Position::from_fen(
        "brnqnbkr/pppppppp/8/8/8/8/PPPPPPPP/BQNRNKRB w GDhb - 0 1",
        true,
    )
    .unwrap();
    let moves = pos.generate_legal_moves();
    // 16 pawn moves, 4 knight moves, and the immediately legal short
    // castle (the f1 king and g1 rook swap in place)
    assert_eq!(moves.len(), 21);

    let castles: Vec<_> = moves.iter().filter(|m| m.is_castling()).collect();
    assert_eq!(castles.len(), 1);
    assert!(castles[0].is_short_castle());
    assert_eq!(castles[0].uci(true), "f1g1");
}

/// The legal move list must be exactly the pseudo-legal list filtered
/// through `is_legal`, and the noisy/quiet split must partition it
#[test]
fn test_movegen_class_consistency_through_game() {
    let mut pos = Position::new();
    let line = [
        "e2e4", "c7c5", "g1f3", "d7d6", "d2d4", "c5d4", "f3d4", "g8f6", "b1c3", "a7a6",
        "c1g5", "e7e6", "f2f4", "f8e7", "d1f3", "d8c7", "e1c1", "b8d7",
    ];
    for uci in line {
        pos.push_uci(uci, false).unwrap();

        let all = pos.generate_pseudo_legal_moves(MoveGen::All);
        let noisy = pos.generate_pseudo_legal_moves(MoveGen::Noisy);
        let quiet = pos.generate_pseudo_legal_moves(MoveGen::Quiet);
        assert_eq!(all.len(), noisy.len() + quiet.len());

        let filtered: Vec<_> = all.iter().filter(|&m| pos.is_legal(m)).collect();
        let legal: Vec<_> = pos.generate_legal_moves().iter().collect();
        assert_eq!(filtered, legal, "after {uci}");
    }
}
