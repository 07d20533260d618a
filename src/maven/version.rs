//! Version ordering and version ranges.
//!
//! Versions are compared component by component on `.`. Each component is a
//! run of digits followed by an optional suffix: numbers compare numerically,
//! then suffixes compare with `-qualifier` ranking below no suffix and a bare
//! letter ranking above it, so `1.2-SNAPSHOT < 1.2 < 1.2a < 1.2.0 < 1.10`.

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Component<'a> {
    significant_digits: usize,
    digits: &'a str,
    suffix_rank: u8,
    suffix: &'a str,
    leading_zeros: usize,
}

impl<'a> Component<'a> {
    fn new(text: &'a str) -> Self {
        let digit_end = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let (all_digits, suffix) = text.split_at(digit_end);
        let digits = all_digits.trim_start_matches('0');
        let suffix_rank = if suffix.starts_with('-') {
            0
        } else if suffix.is_empty() {
            1
        } else {
            2
        };
        Self {
            significant_digits: digits.len(),
            digits,
            suffix_rank,
            suffix,
            leading_zeros: all_digits.len() - digits.len(),
        }
    }
}

/// Total order over version strings. `Equal` only for identical strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => match Component::new(l).cmp(&Component::new(r)) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Highest of `versions` by [`compare_versions`].
pub fn latest<'a>(versions: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    versions
        .into_iter()
        .max_by(|a, b| compare_versions(a, b))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: String,
    inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Interval {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Interval {
    fn contains(&self, version: &str) -> bool {
        if let Some(lower) = &self.lower {
            match compare_versions(version, &lower.version) {
                Ordering::Less => return false,
                Ordering::Equal if !lower.inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match compare_versions(version, &upper.version) {
                Ordering::Greater => return false,
                Ordering::Equal if !upper.inclusive => return false,
                _ => {}
            }
        }
        true
    }
}

/// A bracket version range such as `[1.0,2.0)` or `[1.0,2.0),[3.0,)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    intervals: Vec<Interval>,
}

impl VersionRange {
    pub fn parse(spec: &str) -> Option<Self> {
        let mut intervals = Vec::new();
        let mut rest = spec.trim();
        while !rest.is_empty() {
            let open = rest.chars().next()?;
            if open != '[' && open != '(' {
                return None;
            }
            let close = rest.find([']', ')'])?;
            let body = &rest[1..close];
            let closing = rest[close..].chars().next()?;
            intervals.push(Self::interval(body, open == '[', closing == ']')?);
            rest = rest[close + 1..].trim_start_matches(',').trim();
        }
        (!intervals.is_empty()).then_some(Self { intervals })
    }

    fn interval(body: &str, lower_inclusive: bool, upper_inclusive: bool) -> Option<Interval> {
        let bound = |text: &str, inclusive: bool| {
            let text = text.trim();
            (!text.is_empty()).then(|| Bound {
                version: text.to_string(),
                inclusive,
            })
        };
        match body.split_once(',') {
            Some((low, high)) => Some(Interval {
                lower: bound(low, lower_inclusive),
                upper: bound(high, upper_inclusive),
            }),
            // `[1.0]` pins an exact version.
            None if lower_inclusive && upper_inclusive => {
                let exact = bound(body, true)?;
                Some(Interval {
                    lower: Some(exact.clone()),
                    upper: Some(exact),
                })
            }
            None => None,
        }
    }

    pub fn contains(&self, version: &str) -> bool {
        self.intervals.iter().any(|i| i.contains(version))
    }

    /// Highest of `candidates` inside the range.
    pub fn select<'a>(&self, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
        latest(candidates.into_iter().filter(|v| self.contains(v)))
    }
}
