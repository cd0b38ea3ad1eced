use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{Direction, Vec2};

pub fn now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    now as u64
}

/// Neighbor one step away, without any wraparound.
pub(super) fn offset(pos: Vec2, dir: Direction) -> Vec2 {
    let (dx, dy) = dir.delta();
    Vec2::new(pos.x + dx, pos.y + dy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_follows_screen_axes() {
        let origin = Vec2::new(3, 3);
        assert_eq!(offset(origin, Direction::Up), Vec2::new(3, 2));
        assert_eq!(offset(origin, Direction::Down), Vec2::new(3, 4));
        assert_eq!(offset(origin, Direction::Left), Vec2::new(2, 3));
        assert_eq!(offset(origin, Direction::Right), Vec2::new(4, 3));
    }
}
