/// Builds `PREFIX-SIZE-COLOR` where the prefix is the first three
/// characters of the product name. All segments are upper-cased and inner
/// whitespace runs become single hyphens.
///
/// Surrounding whitespace is dropped first: the name is trimmed before the
/// prefix is taken and size/color never gain leading or trailing hyphens,
/// so `"  cap"` yields `CAP` rather than `"  C"` and `" L "` yields `L`.
///
/// No uniqueness check happens here; the store rejects collisions and
/// blank segments.
pub fn generate_sku(product_name: &str, color: &str, size: &str) -> String {
    let prefix: String = product_name.trim().chars().take(3).collect();
    format!(
        "{}-{}-{}",
        prefix.to_uppercase(),
        segment(size),
        segment(color)
    )
}

fn segment(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Tee Shirt", "Red", "S", "TEE-S-RED")]
    #[case("Hoodie", "Forest Green", "x large", "HOO-X-LARGE-FOREST-GREEN")]
    #[case("Go", "Blue", "M", "GO-M-BLUE")]
    #[case("  cap", "navy", "one size", "CAP-ONE-SIZE-NAVY")]
    #[case("Tee", " Red ", " L ", "TEE-L-RED")]
    fn builds_expected_sku(
        #[case] name: &str,
        #[case] color: &str,
        #[case] size: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(generate_sku(name, color, size), expected);
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(
            generate_sku("Sweater", "Light Grey", "XL"),
            generate_sku("Sweater", "Light Grey", "XL")
        );
    }

    #[test]
    fn blank_color_leaves_empty_segment() {
        assert_eq!(generate_sku("Tee", "", "S"), "TEE-S-");
    }
}
