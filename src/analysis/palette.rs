//! Deterministic color assignment for chart series and flow nodes.

/// Fixed palette shared by every chart
pub const PALETTE: [&str; 12] = [
    "#6366F1", "#10B981", "#F59E0B", "#EF4444", "#8B5CF6", "#06B6D4",
    "#EC4899", "#84CC16", "#F97316", "#14B8A6", "#3B82F6", "#A855F7",
];

/// Rolling 31-multiplier hash over the UTF-16 code units of `name`
fn name_hash(name: &str) -> i32 {
    name.encode_utf16().fold(0i32, |hash, unit| {
        (unit as i32).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash))
    })
}

/// Pick a palette color for `name`. The same name always gets the same color.
pub fn color_for(name: &str) -> &'static str {
    let index = name_hash(name).unsigned_abs() as usize % PALETTE.len();
    PALETTE[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_is_deterministic() {
        assert_eq!(color_for("Checkout"), color_for("Checkout"));
        assert!(PALETTE.contains(&color_for("Checkout")));
    }

    #[test]
    fn test_empty_name_uses_first_color() {
        assert_eq!(color_for(""), PALETTE[0]);
    }

    #[test]
    fn test_hash_matches_rolling_formula() {
        // 'a' = 97, 'b' = 98 -> 97 * 31 + 98
        assert_eq!(name_hash("ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_hash_walks_surrogate_pairs() {
        // U+1F600 is the pair D83D DE00
        assert_eq!(name_hash("\u{1F600}"), 0xD83D * 31 + 0xDE00);
        assert_eq!(name_hash("é"), 0xE9);
    }
}
