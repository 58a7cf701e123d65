use std::cmp::Ordering;

/// An entity that can be listed under a human-facing tag.
pub trait DisplayTag {
    /// The label an operator sees: first tag, then a fallback, then the id.
    fn display_tag(&self) -> &str;

    /// Whether the entity carries a real tag (as opposed to a fallback).
    fn is_tagged(&self) -> bool;
}

/// Tagged entities first, then lexicographic by display tag.
pub fn display_order<T: DisplayTag>(a: &T, b: &T) -> Ordering {
    b.is_tagged()
        .cmp(&a.is_tagged())
        .then_with(|| a.display_tag().cmp(b.display_tag()))
}

pub fn sort_for_display<T: DisplayTag>(items: &mut [T]) {
    items.sort_by(display_order);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(&'static str, bool);

    impl DisplayTag for Item {
        fn display_tag(&self) -> &str {
            self.0
        }
        fn is_tagged(&self) -> bool {
            self.1
        }
    }

    #[test]
    fn tagged_before_untagged() {
        let mut items = vec![
            Item("a-untagged", false),
            Item("z-tagged", true),
            Item("b-tagged", true),
            Item("0-untagged", false),
        ];
        sort_for_display(&mut items);
        let order: Vec<&str> = items.iter().map(|i| i.0).collect();
        assert_eq!(order, ["b-tagged", "z-tagged", "0-untagged", "a-untagged"]);
    }

    #[test]
    fn equal_tags_compare_equal() {
        assert_eq!(
            display_order(&Item("x", true), &Item("x", true)),
            Ordering::Equal
        );
    }
}
