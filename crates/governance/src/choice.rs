//! Encoding of a voter's selection and the power each selected option receives
//!
//! A single choice is the label of one option. A multiple choice is a JSON
//! array of unique labels, e.g. `["A","B"]`; the empty string stands for no
//! selection in both modes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use voty_common::{Error, Result};

/// How many options a voter may select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingType {
    Single,
    Multiple,
}

/// An encoded selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Choice(String);

impl Choice {
    /// The raw encoding
    pub fn new<S: Into<String>>(encoded: S) -> Self {
        Self(encoded.into())
    }

    /// No selection
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single-choice selection of `option`
    pub fn single<S: Into<String>>(option: S) -> Self {
        Self(option.into())
    }

    /// A multiple-choice selection of `options`, in the given order
    pub fn multiple<I, S>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let mut labels = Vec::new();
        for option in options {
            let option = option.into();
            if !seen.insert(option.clone()) {
                return Err(Error::invalid_choice(format!("option selected twice: {}", option)));
            }
            labels.push(option);
        }
        encode(&labels)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Selected labels in selection order
    pub fn options(&self, voting_type: VotingType) -> Result<Vec<String>> {
        match voting_type {
            VotingType::Single if self.0.is_empty() => Ok(Vec::new()),
            VotingType::Single => Ok(vec![self.0.clone()]),
            VotingType::Multiple => decode(&self.0),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn decode(encoded: &str) -> Result<Vec<String>> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    let labels: Vec<String> = serde_json::from_str(encoded)
        .map_err(|e| Error::invalid_choice(format!("malformed multiple choice {:?}: {}", encoded, e)))?;

    let mut seen = BTreeSet::new();
    if let Some(duplicate) = labels.iter().find(|label| !seen.insert(label.as_str())) {
        return Err(Error::invalid_choice(format!("option selected twice: {}", duplicate)));
    }
    Ok(labels)
}

fn encode(labels: &[String]) -> Result<Choice> {
    serde_json::to_string(labels)
        .map(Choice)
        .map_err(|e| Error::invalid_choice(e.to_string()))
}

/// Whether `option` is part of `choice`
pub fn check_choice(voting_type: VotingType, choice: &Choice, option: &str) -> Result<bool> {
    match voting_type {
        VotingType::Single => Ok(choice.as_str() == option),
        VotingType::Multiple => Ok(decode(choice.as_str())?.iter().any(|label| label == option)),
    }
}

/// Whether nothing is selected
pub fn choice_is_empty(voting_type: VotingType, choice: &Choice) -> Result<bool> {
    Ok(choice.options(voting_type)?.is_empty())
}

/// The choice after the voter picks `option`.
///
/// Single choice replaces the selection. Multiple choice toggles `option`,
/// keeping the remaining options in their order.
pub fn update_choice(voting_type: VotingType, choice: &Choice, option: &str) -> Result<Choice> {
    match voting_type {
        VotingType::Single => Ok(Choice::single(option)),
        VotingType::Multiple => {
            let mut labels = decode(choice.as_str())?;
            match labels.iter().position(|label| label == option) {
                Some(index) => {
                    labels.remove(index);
                }
                None => labels.push(option.to_string()),
            }
            encode(&labels)
        }
    }
}

/// Split `power` across the options selected in `choice`.
///
/// Single choice gives everything to the one option. Multiple choice splits
/// evenly; see [`power_of_weighted_choice`] for how remainders are placed.
/// An empty choice yields an empty map.
pub fn power_of_choice(voting_type: VotingType, choice: &Choice, power: Decimal) -> Result<BTreeMap<String, Decimal>> {
    ensure_non_negative(power)?;
    let labels = choice.options(voting_type)?;
    let weights: BTreeMap<String, u32> = labels.into_iter().map(|label| (label, 1)).collect();
    split(&weights, power)
}

/// Split `power` across options in proportion to integer weights.
///
/// Shares are computed in units of 10^-s, where s is the larger of the
/// power's own scale and 18, lowered only as far as the decimal range
/// requires. Units left over after flooring go one each to the options with
/// the largest remainders, ties going to the lexicographically smaller
/// label. The shares always sum to exactly `power`. Options with weight
/// zero are left out.
pub fn power_of_weighted_choice(weights: &BTreeMap<String, u32>, power: Decimal) -> Result<BTreeMap<String, Decimal>> {
    ensure_non_negative(power)?;
    let weights: BTreeMap<String, u32> = weights
        .iter()
        .filter(|(_, weight)| **weight > 0)
        .map(|(label, weight)| (label.clone(), *weight))
        .collect();
    split(&weights, power)
}

const SPLIT_SCALE: u32 = 18;
const MAX_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

fn ensure_non_negative(power: Decimal) -> Result<()> {
    if power.is_sign_negative() && !power.is_zero() {
        return Err(Error::invalid_vote(format!("power must not be negative: {}", power)));
    }
    Ok(())
}

fn split(weights: &BTreeMap<String, u32>, power: Decimal) -> Result<BTreeMap<String, Decimal>> {
    if weights.is_empty() {
        return Ok(BTreeMap::new());
    }

    let (units, scale) = to_units(power)?;
    let total_weight: u128 = weights.values().map(|w| u128::from(*w)).sum();

    let mut shares: Vec<(&String, u128, u128)> = weights
        .iter()
        .map(|(label, weight)| {
            let scaled = units * u128::from(*weight);
            (label, scaled / total_weight, scaled % total_weight)
        })
        .collect();

    let allotted: u128 = shares.iter().map(|(_, floor, _)| floor).sum();
    let leftover = units - allotted;

    // BTreeMap order is label order, so a stable sort keeps ties by label
    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|a, b| shares[*b].2.cmp(&shares[*a].2));
    for index in order.into_iter().take(leftover as usize) {
        shares[index].1 += 1;
    }

    shares
        .into_iter()
        .map(|(label, units, _)| Ok::<_, Error>((label.clone(), from_units(units, scale)?)))
        .collect()
}

/// Express `power` as an integer count of 10^-scale units
fn to_units(power: Decimal) -> Result<(u128, u32)> {
    let mantissa = power.mantissa().unsigned_abs();
    let own_scale = power.scale();
    let mut scale = own_scale.max(SPLIT_SCALE);

    loop {
        let units = 10u128
            .checked_pow(scale - own_scale)
            .and_then(|factor| mantissa.checked_mul(factor))
            .filter(|units| *units <= MAX_MANTISSA);
        match units {
            Some(units) => return Ok((units, scale)),
            None if scale > own_scale => scale -= 1,
            None => return Err(Error::precision_overflow(format!("cannot split {}", power))),
        }
    }
}

fn from_units(units: u128, scale: u32) -> Result<Decimal> {
    let units = i128::try_from(units).map_err(|e| Error::precision_overflow(e.to_string()))?;
    Decimal::try_from_i128_with_scale(units, scale)
        .map(|d| d.normalize())
        .map_err(|e| Error::precision_overflow(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn multiple(labels: &[&str]) -> Choice {
        Choice::multiple(labels.iter().copied()).unwrap()
    }

    fn map(entries: &[(&str, Decimal)]) -> BTreeMap<String, Decimal> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_single_choice_power() {
        let power = power_of_choice(VotingType::Single, &Choice::single("Yes"), dec!(100)).unwrap();
        assert_eq!(power, map(&[("Yes", dec!(100))]));

        let power = power_of_choice(VotingType::Single, &Choice::empty(), dec!(100)).unwrap();
        assert!(power.is_empty());
    }

    #[test]
    fn test_even_split() {
        let power = power_of_choice(VotingType::Multiple, &multiple(&["A", "B"]), dec!(100)).unwrap();
        assert_eq!(power, map(&[("A", dec!(50)), ("B", dec!(50))]));
    }

    #[test]
    fn test_split_sums_exactly() {
        let power = power_of_choice(VotingType::Multiple, &multiple(&["A", "B", "C"]), dec!(100)).unwrap();
        assert_eq!(power.values().copied().sum::<Decimal>(), dec!(100));
        assert_eq!(power["A"], dec!(33.333333333333333334));
        assert_eq!(power["B"], dec!(33.333333333333333333));
        assert_eq!(power["C"], dec!(33.333333333333333333));

        for n in 1..=12 {
            let labels: Vec<String> = (0..n).map(|i| format!("option-{}", i)).collect();
            let choice = Choice::multiple(labels).unwrap();
            for total in [dec!(1), dec!(7), dec!(0.000000000000000001), dec!(123456789.123)] {
                let power = power_of_choice(VotingType::Multiple, &choice, total).unwrap();
                assert_eq!(power.len(), n);
                assert_eq!(power.values().copied().sum::<Decimal>(), total, "{} over {}", total, n);
            }
        }
    }

    #[test]
    fn test_split_ignores_selection_order() {
        let forward = power_of_choice(VotingType::Multiple, &multiple(&["A", "B", "C"]), dec!(10)).unwrap();
        let backward = power_of_choice(VotingType::Multiple, &multiple(&["C", "B", "A"]), dec!(10)).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_split_of_large_power() {
        let total = Decimal::MAX;
        let power = power_of_choice(VotingType::Multiple, &multiple(&["A", "B", "C"]), total).unwrap();
        assert_eq!(power.values().try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v)), Some(total));
    }

    #[test]
    fn test_weighted_split() {
        let weights: BTreeMap<String, u32> = [("A".to_string(), 2), ("B".to_string(), 1), ("C".to_string(), 0)]
            .into_iter()
            .collect();
        let power = power_of_weighted_choice(&weights, dec!(90)).unwrap();
        assert_eq!(power, map(&[("A", dec!(60)), ("B", dec!(30))]));
    }

    #[test]
    fn test_negative_power_rejected() {
        let result = power_of_choice(VotingType::Single, &Choice::single("Yes"), dec!(-1));
        assert!(matches!(result, Err(Error::InvalidVote(_))));
    }

    #[test]
    fn test_check_and_empty() {
        assert!(check_choice(VotingType::Single, &Choice::single("Yes"), "Yes").unwrap());
        assert!(!check_choice(VotingType::Single, &Choice::single("Yes"), "No").unwrap());
        assert!(check_choice(VotingType::Multiple, &multiple(&["A", "B"]), "B").unwrap());
        assert!(!check_choice(VotingType::Multiple, &multiple(&["A", "B"]), "C").unwrap());

        assert!(choice_is_empty(VotingType::Single, &Choice::empty()).unwrap());
        assert!(choice_is_empty(VotingType::Multiple, &Choice::empty()).unwrap());
        assert!(choice_is_empty(VotingType::Multiple, &Choice::new("[]")).unwrap());
        assert!(!choice_is_empty(VotingType::Multiple, &multiple(&["A"])).unwrap());
    }

    #[test]
    fn test_update_multiple_toggles() {
        let updated = update_choice(VotingType::Multiple, &multiple(&["A"]), "B").unwrap();
        assert_eq!(updated.options(VotingType::Multiple).unwrap(), vec!["A", "B"]);

        let removed = update_choice(VotingType::Multiple, &multiple(&["A", "B", "C"]), "B").unwrap();
        assert_eq!(removed.options(VotingType::Multiple).unwrap(), vec!["A", "C"]);
    }

    #[test]
    fn test_update_single_replaces() {
        let updated = update_choice(VotingType::Single, &Choice::single("Yes"), "No").unwrap();
        assert_eq!(updated, Choice::single("No"));
    }

    #[test]
    fn test_update_is_involution_and_round_trips() {
        let starts = [Choice::empty(), multiple(&["A"]), multiple(&["B", "A"]), multiple(&["A", "B", "C"])];
        for start in &starts {
            for option in ["A", "B", "C", "D"] {
                let was_selected = check_choice(VotingType::Multiple, start, option).unwrap();
                let once = update_choice(VotingType::Multiple, start, option).unwrap();
                assert_eq!(check_choice(VotingType::Multiple, &once, option).unwrap(), !was_selected);

                let twice = update_choice(VotingType::Multiple, &once, option).unwrap();
                assert_eq!(
                    twice.options(VotingType::Multiple).unwrap(),
                    start.options(VotingType::Multiple).unwrap()
                );
            }
        }

        for option in ["Yes", "No"] {
            let updated = update_choice(VotingType::Single, &Choice::single("Yes"), option).unwrap();
            assert!(check_choice(VotingType::Single, &updated, option).unwrap());
        }
    }

    #[test]
    fn test_malformed_multiple_choice() {
        for encoded in ["A", "[\"A\",", "{\"A\":1}", "[\"A\",\"A\"]"] {
            let result = choice_is_empty(VotingType::Multiple, &Choice::new(encoded));
            assert!(matches!(result, Err(Error::InvalidChoice(_))), "{}", encoded);
        }
        assert!(Choice::multiple(["A", "A"]).is_err());
    }

    #[test]
    fn test_encoding() {
        assert_eq!(multiple(&["B", "A"]).as_str(), r#"["B","A"]"#);
        assert_eq!(serde_json::to_string(&VotingType::Multiple).unwrap(), r#""multiple""#);
    }
}
