use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::PlayError;

/// Video resolution, ordered by pixel area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u64,
    pub height: u64,
}

impl Resolution {
    pub fn new(width: u64, height: u64) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u128 {
        self.width as u128 * self.height as u128
    }
}

impl PartialOrd for Resolution {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Resolution {
    fn cmp(&self, other: &Self) -> Ordering {
        self.area()
            .cmp(&other.area())
            .then(self.width.cmp(&other.width))
    }
}

impl FromStr for Resolution {
    type Err = PlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlayError::InvalidResolution(s.to_string());
        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = width.trim().parse().map_err(|_| invalid())?;
        let height = height.trim().parse().map_err(|_| invalid())?;
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = PlayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How one attribute of a variant is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum SelectionPolicy<T> {
    Min,
    Max,
    /// Only an exact match is accepted. An unset target never matches.
    Custom(Option<T>),
}

impl<T> Default for SelectionPolicy<T> {
    fn default() -> Self {
        Self::Min
    }
}

impl<T: Ord> SelectionPolicy<T> {
    pub fn accept(&self, candidate: &T, last_accepted: Option<&T>) -> bool {
        match self {
            Self::Min => last_accepted.map_or(true, |last| candidate <= last),
            Self::Max => last_accepted.map_or(true, |last| candidate >= last),
            Self::Custom(target) => target.as_ref() == Some(candidate),
        }
    }

    pub fn has_target(&self) -> bool {
        matches!(self, Self::Custom(Some(_)))
    }
}

impl<T: FromStr> FromStr for SelectionPolicy<T> {
    type Err = T::Err;

    /// `min`, `max` or a literal custom target.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "" | "custom" => Ok(Self::Custom(None)),
            _ => s.trim().parse().map(|t| Self::Custom(Some(t))),
        }
    }
}

/// Anything that can be ranked by [`VariantSelector`].
pub trait Selectable {
    fn bandwidth(&self) -> Option<u64>;

    fn resolution(&self) -> Option<Resolution>;
}

impl<T: Selectable> Selectable for &T {
    fn bandwidth(&self) -> Option<u64> {
        (**self).bandwidth()
    }

    fn resolution(&self) -> Option<Resolution> {
        (**self).resolution()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSelector {
    #[serde(default)]
    pub bandwidth: SelectionPolicy<u64>,
    #[serde(default)]
    pub resolution: SelectionPolicy<Resolution>,
}

impl VariantSelector {
    pub fn new(bandwidth: SelectionPolicy<u64>, resolution: SelectionPolicy<Resolution>) -> Self {
        Self {
            bandwidth,
            resolution,
        }
    }

    /// Resolution leads only when it carries a custom target and bandwidth does not.
    pub fn resolution_is_primary(&self) -> bool {
        !self.bandwidth.has_target() && self.resolution.has_target()
    }

    pub fn select<'a, V: Selectable>(&self, variants: &'a [V]) -> Option<&'a V> {
        self.select_index(variants).map(|index| &variants[index])
    }

    pub fn select_index<V: Selectable>(&self, variants: &[V]) -> Option<usize> {
        if self.resolution_is_primary() {
            select_by(
                variants,
                (&self.resolution, V::resolution),
                (&self.bandwidth, V::bandwidth),
            )
        } else {
            select_by(
                variants,
                (&self.bandwidth, V::bandwidth),
                (&self.resolution, V::resolution),
            )
        }
    }
}

fn select_by<V, P, S>(
    variants: &[V],
    (primary, primary_key): (&SelectionPolicy<P>, fn(&V) -> Option<P>),
    (secondary, secondary_key): (&SelectionPolicy<S>, fn(&V) -> Option<S>),
) -> Option<usize>
where
    P: Ord,
    S: Ord,
{
    let primary_value = best_value(variants.iter(), primary, primary_key)?;
    let secondary_value = best_value(
        variants.iter().filter(|v| primary_key(v) == primary_value),
        secondary,
        secondary_key,
    )?;

    variants
        .iter()
        .position(|v| primary_key(v) == primary_value && secondary_key(v) == secondary_value)
}

/// Running min/max/exact value of one attribute over `variants`.
///
/// Returns `None` when nothing can be selected, `Some(None)` when min/max was requested but no
/// variant declares the attribute (every variant then shares the "absent" value).
fn best_value<'a, V: 'a, T: Ord>(
    variants: impl Iterator<Item = &'a V>,
    policy: &SelectionPolicy<T>,
    key: fn(&V) -> Option<T>,
) -> Option<Option<T>> {
    let mut seen = false;
    let mut best: Option<T> = None;
    for variant in variants {
        seen = true;
        if let Some(value) = key(variant) {
            if policy.accept(&value, best.as_ref()) {
                best = Some(value);
            }
        }
    }

    match policy {
        SelectionPolicy::Custom(_) => best.map(Some),
        _ if seen => Some(best),
        _ => None,
    }
}
