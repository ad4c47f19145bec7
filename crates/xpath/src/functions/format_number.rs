//! Decimal formats and the `format-number()` picture language.

use std::collections::HashMap;

use crate::error::{EvaluationError, Result};
use crate::names::ExpandedName;

/// Symbols of one `xsl:decimal-format`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecimalFormat {
    pub decimal_separator: char,
    pub grouping_separator: char,
    pub infinity: String,
    pub minus_sign: char,
    pub nan: String,
    pub percent: char,
    pub per_mille: char,
    pub zero_digit: char,
    pub digit: char,
    pub pattern_separator: char,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            infinity: "Infinity".to_string(),
            minus_sign: '-',
            nan: "NaN".to_string(),
            percent: '%',
            per_mille: '\u{2030}',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SubPicture {
    prefix: String,
    suffix: String,
    min_int: usize,
    min_frac: usize,
    max_frac: usize,
    grouping: Option<usize>,
    multiplier: f64,
}

impl DecimalFormat {
    fn is_number_char(&self, c: char) -> bool {
        c == self.digit || c == self.zero_digit || c == self.grouping_separator || c == self.decimal_separator
    }

    fn parse_sub_picture(&self, picture: &str) -> core::result::Result<SubPicture, String> {
        let mut sub = SubPicture {
            multiplier: 1.0,
            ..SubPicture::default()
        };
        let chars: Vec<char> = picture.chars().collect();
        let mut i = 0;
        let mut quoted = false;
        while i < chars.len() && (quoted || !self.is_number_char(chars[i])) {
            self.affix_char(chars[i], &mut quoted, &mut sub, true);
            i += 1;
        }
        let mut in_fraction = false;
        let mut int_digits_since_group: Option<usize> = None;
        let mut saw_digit = false;
        let mut saw_int_zero = false;
        let mut saw_frac_hash = false;
        while i < chars.len() && self.is_number_char(chars[i]) {
            let c = chars[i];
            if c == self.decimal_separator {
                if in_fraction {
                    return Err("multiple decimal separators".to_string());
                }
                in_fraction = true;
            } else if c == self.grouping_separator {
                if in_fraction {
                    return Err("grouping separator in fractional part".to_string());
                }
                int_digits_since_group = Some(0);
            } else if in_fraction {
                saw_digit = true;
                if c == self.zero_digit {
                    if saw_frac_hash {
                        return Err(format!("unexpected '{c}' after '{}'", self.digit));
                    }
                    sub.min_frac += 1;
                } else {
                    saw_frac_hash = true;
                }
                sub.max_frac += 1;
            } else {
                saw_digit = true;
                if c == self.zero_digit {
                    saw_int_zero = true;
                    sub.min_int += 1;
                } else if saw_int_zero {
                    return Err(format!("unexpected '{c}' after '{}'", self.zero_digit));
                }
                if let Some(n) = int_digits_since_group.as_mut() {
                    *n += 1;
                }
            }
            i += 1;
        }
        if !saw_digit {
            return Err("no digits in pattern".to_string());
        }
        sub.grouping = int_digits_since_group.filter(|n| *n > 0);
        while i < chars.len() {
            let c = chars[i];
            if !quoted && self.is_number_char(c) {
                return Err(format!("malformed pattern at '{c}'"));
            }
            self.affix_char(c, &mut quoted, &mut sub, false);
            i += 1;
        }
        if quoted {
            return Err("unterminated quote".to_string());
        }
        Ok(sub)
    }

    fn affix_char(&self, c: char, quoted: &mut bool, sub: &mut SubPicture, prefix: bool) {
        let target = if prefix { &mut sub.prefix } else { &mut sub.suffix };
        if c == '\'' {
            *quoted = !*quoted;
            return;
        }
        if !*quoted {
            if c == self.percent {
                sub.multiplier = 100.0;
            } else if c == self.per_mille {
                sub.multiplier = 1000.0;
            }
        }
        target.push(c);
    }

    /// Format `n` with `picture`, which may hold a negative sub-picture after
    /// the pattern separator.
    pub fn format(&self, n: f64, picture: &str) -> Result<String> {
        let fail = |reason: String| {
            EvaluationError::function(format!(
                "Unable to interpret format pattern {picture} ({reason})"
            ))
        };
        let (pos_text, neg_text) = match picture.split_once(self.pattern_separator) {
            Some((p, n)) => (p, Some(n)),
            None => (picture, None),
        };
        let positive = self.parse_sub_picture(pos_text).map_err(fail)?;
        if n.is_nan() {
            return Ok(self.nan.clone());
        }
        let negative = n < 0.0;
        let (prefix, suffix) = if negative {
            match neg_text {
                Some(t) => {
                    let sub = self.parse_sub_picture(t).map_err(fail)?;
                    (sub.prefix, sub.suffix)
                }
                None => (
                    format!("{}{}", self.minus_sign, positive.prefix),
                    positive.suffix.clone(),
                ),
            }
        } else {
            (positive.prefix.clone(), positive.suffix.clone())
        };
        let body = if n.is_infinite() {
            self.infinity.clone()
        } else {
            self.format_digits(n.abs() * positive.multiplier, &positive)
        };
        Ok(format!("{prefix}{body}{suffix}"))
    }

    fn format_digits(&self, n: f64, sub: &SubPicture) -> String {
        let fixed = format!("{:.*}", sub.max_frac, n);
        let (int_raw, frac_raw) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let mut frac = frac_raw.to_string();
        while frac.len() > sub.min_frac && frac.ends_with('0') {
            frac.pop();
        }
        let mut int = int_raw.trim_start_matches('0').to_string();
        while int.len() < sub.min_int {
            int.insert(0, '0');
        }
        if int.is_empty() && frac.is_empty() {
            int.push('0');
        }
        let mut out = String::new();
        let digits: Vec<char> = int.chars().collect();
        for (i, d) in digits.iter().enumerate() {
            let remaining = digits.len() - i;
            if i > 0 {
                if let Some(g) = sub.grouping {
                    if remaining % g == 0 {
                        out.push(self.grouping_separator);
                    }
                }
            }
            out.push(self.localize(*d));
        }
        if !frac.is_empty() {
            out.push(self.decimal_separator);
            out.extend(frac.chars().map(|d| self.localize(d)));
        }
        out
    }

    fn localize(&self, d: char) -> char {
        match d.to_digit(10) {
            Some(v) => char::from_u32(u32::from(self.zero_digit) + v).unwrap_or(d),
            None => d,
        }
    }
}

/// The default decimal format plus the named ones.
#[derive(Debug, Clone, Default)]
pub struct DecimalFormatManager {
    default: DecimalFormat,
    named: HashMap<ExpandedName, DecimalFormat>,
}

impl DecimalFormatManager {
    pub fn register(&mut self, name: Option<ExpandedName>, format: DecimalFormat) {
        match name {
            Some(n) => {
                self.named.insert(n, format);
            }
            None => self.default = format,
        }
    }

    pub fn default_format(&self) -> &DecimalFormat {
        &self.default
    }

    pub fn named(&self, name: &ExpandedName) -> Option<&DecimalFormat> {
        self.named.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(n: f64, p: &str) -> String {
        DecimalFormat::default().format(n, p).unwrap()
    }

    #[test]
    fn integer_and_fraction_digits() {
        assert_eq!(fmt(1234.5, "#,##0.00"), "1,234.50");
        assert_eq!(fmt(0.5, "#.##"), ".5");
        assert_eq!(fmt(0.0, "#"), "0");
        assert_eq!(fmt(7.0, "000"), "007");
        assert_eq!(fmt(1234567.0, "#,###"), "1,234,567");
    }

    #[test]
    fn percent_and_negative_pictures() {
        assert_eq!(fmt(0.25, "0%"), "25%");
        assert_eq!(fmt(-3.0, "0"), "-3");
        assert_eq!(fmt(-3.0, "0;(0)"), "(3)");
        assert_eq!(fmt(f64::NAN, "0"), "NaN");
        assert_eq!(fmt(f64::NEG_INFINITY, "0"), "-Infinity");
    }

    #[test]
    fn bad_pictures_fail() {
        let err = DecimalFormat::default().format(1.0, "0.0.0").unwrap_err();
        assert!(err.message.starts_with("Unable to interpret format pattern 0.0.0"));
        assert!(DecimalFormat::default().format(1.0, "abc").is_err());
    }
}
