use crate::{Color, Coord, BOARD_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Line directions scanned for a win. The opposing direction of each is
/// covered by walking both ways from the placed stone.
const AXES: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

/// How long a line has to be to win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WinRule {
    /// Exactly five in a row; six or more does not count.
    #[default]
    ExactlyFive,
    /// Five or more in a row.
    FiveOrMore,
}

impl WinRule {
    fn is_win(self, len: u32) -> bool {
        match self {
            WinRule::ExactlyFive => len == 5,
            WinRule::FiveOrMore => len >= 5,
        }
    }
}

/// Occupied intersections per color.
///
/// A coordinate belongs to at most one color. Callers check
/// [`Board::is_taken`] before [`Board::place`]; `place` itself refuses to
/// overwrite a stone of the other color.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    black: BTreeSet<Coord>,
    white: BTreeSet<Coord>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stones(&self, color: Color) -> &BTreeSet<Coord> {
        match color {
            Color::Black => &self.black,
            Color::White => &self.white,
        }
    }

    fn stones_mut(&mut self, color: Color) -> &mut BTreeSet<Coord> {
        match color {
            Color::Black => &mut self.black,
            Color::White => &mut self.white,
        }
    }

    /// Returns the color occupying `coord`, if any.
    pub fn taken_by(&self, coord: Coord) -> Option<Color> {
        if self.black.contains(&coord) {
            Some(Color::Black)
        } else if self.white.contains(&coord) {
            Some(Color::White)
        } else {
            None
        }
    }

    pub fn is_taken(&self, coord: Coord) -> bool {
        self.taken_by(coord).is_some()
    }

    /// Places a stone. Returns false and leaves the board untouched if the
    /// intersection is already occupied.
    pub fn place(&mut self, coord: Coord, color: Color) -> bool {
        if self.is_taken(coord) {
            return false;
        }
        self.stones_mut(color).insert(coord)
    }

    pub fn len(&self) -> usize {
        self.black.len() + self.white.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts consecutive `color` stones starting next to `from` and walking
    /// along `(dx, dy)`. Bounded by the board edge.
    fn run_length(&self, color: Color, from: Coord, (dx, dy): (i32, i32)) -> u32 {
        let stones = self.stones(color);
        let mut count = 0;
        let (mut x, mut y) = (i32::from(from.x), i32::from(from.y));

        for _ in 0..BOARD_SIZE {
            x += dx;
            y += dy;
            match Coord::checked(x, y) {
                Some(next) if stones.contains(&next) => count += 1,
                _ => break,
            }
        }

        count
    }

    /// Longest line of `color` through `placed`, per axis, in `AXES` order.
    pub fn line_lengths(&self, placed: Coord, color: Color) -> [u32; 4] {
        AXES.map(|axis| {
            let back = (-axis.0, -axis.1);
            1 + self.run_length(color, placed, axis) + self.run_length(color, placed, back)
        })
    }

    /// Whether the stone just placed at `placed` completes a winning line.
    pub fn check_win(&self, placed: Coord, color: Color, rule: WinRule) -> bool {
        self.line_lengths(placed, color)
            .into_iter()
            .any(|len| rule.is_win(len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: u8, y: u8) -> Coord {
        Coord::new(x, y).unwrap()
    }

    fn place_all(board: &mut Board, coords: &[(u8, u8)], color: Color) {
        for &(x, y) in coords {
            assert!(board.place(c(x, y), color));
        }
    }

    #[test]
    fn test_place_marks_exactly_one_color() {
        for x in 1..=BOARD_SIZE {
            for y in 1..=BOARD_SIZE {
                let mut board = Board::new();
                assert!(board.place(c(x, y), Color::White));
                assert!(board.stones(Color::White).contains(&c(x, y)));
                assert!(!board.stones(Color::Black).contains(&c(x, y)));
                assert_eq!(board.taken_by(c(x, y)), Some(Color::White));
            }
        }
    }

    #[test]
    fn test_place_refuses_occupied() {
        let mut board = Board::new();
        assert!(board.place(c(7, 7), Color::Black));
        assert!(!board.place(c(7, 7), Color::White));
        assert!(!board.place(c(7, 7), Color::Black));
        assert_eq!(board.len(), 1);
        assert_eq!(board.taken_by(c(7, 7)), Some(Color::Black));
    }

    #[test]
    fn test_empty_board() {
        let board = Board::new();
        assert!(board.is_empty());
        assert_eq!(board.taken_by(c(1, 1)), None);
    }

    #[test]
    fn test_horizontal_five_wins_from_any_stone() {
        let line = [(3, 5), (4, 5), (5, 5), (6, 5), (7, 5)];
        for &(x, y) in &line {
            let mut board = Board::new();
            place_all(&mut board, &line, Color::Black);
            assert!(board.check_win(c(x, y), Color::Black, WinRule::ExactlyFive));
        }
    }

    #[test]
    fn test_vertical_and_diagonal_wins() {
        let vertical = [(9, 1), (9, 2), (9, 3), (9, 4), (9, 5)];
        let diagonal = [(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)];
        let anti_diagonal = [(11, 15), (12, 14), (13, 13), (14, 12), (15, 11)];

        for line in [vertical, diagonal, anti_diagonal] {
            let mut board = Board::new();
            place_all(&mut board, &line, Color::White);
            let (x, y) = line[2];
            assert!(board.check_win(c(x, y), Color::White, WinRule::ExactlyFive));
        }
    }

    #[test]
    fn test_four_is_not_a_win() {
        let mut board = Board::new();
        place_all(&mut board, &[(1, 8), (2, 8), (3, 8), (4, 8)], Color::Black);
        assert!(!board.check_win(c(4, 8), Color::Black, WinRule::ExactlyFive));
        assert!(!board.check_win(c(4, 8), Color::Black, WinRule::FiveOrMore));
    }

    #[test]
    fn test_other_color_breaks_the_line() {
        let mut board = Board::new();
        place_all(&mut board, &[(1, 1), (2, 1), (4, 1), (5, 1)], Color::Black);
        board.place(c(3, 1), Color::White);
        assert!(!board.check_win(c(5, 1), Color::Black, WinRule::ExactlyFive));
        assert_eq!(board.line_lengths(c(5, 1), Color::Black)[0], 2);
    }

    #[test]
    fn test_overline_depends_on_rule() {
        let mut board = Board::new();
        place_all(
            &mut board,
            &[(1, 3), (2, 3), (3, 3), (4, 3), (5, 3), (6, 3)],
            Color::Black,
        );
        assert_eq!(board.line_lengths(c(6, 3), Color::Black)[0], 6);
        assert!(!board.check_win(c(6, 3), Color::Black, WinRule::ExactlyFive));
        assert!(board.check_win(c(6, 3), Color::Black, WinRule::FiveOrMore));
    }

    #[test]
    fn test_scan_stops_at_edges() {
        let mut board = Board::new();
        place_all(
            &mut board,
            &[(15, 15), (14, 15), (13, 15), (12, 15), (11, 15)],
            Color::White,
        );
        assert!(board.check_win(c(15, 15), Color::White, WinRule::ExactlyFive));
        assert_eq!(board.line_lengths(c(15, 15), Color::White), [5, 1, 1, 1]);
    }

    #[test]
    fn test_board_serialization() {
        let mut board = Board::new();
        board.place(c(1, 1), Color::Black);
        board.place(c(1, 2), Color::White);

        let bytes = bincode::serialize(&board).unwrap();
        let decoded: Board = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, board);
    }
}
