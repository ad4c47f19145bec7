use crate::error::Result;
use crate::model::XmlNode;
use crate::nodeset::NodeSetValue;
use crate::value::string_to_number;

#[allow(clippy::cast_precision_loss)]
pub(crate) fn position_number(p: usize) -> f64 {
    p as f64
}

/// XPath `round()`: half-way values go towards positive infinity and
/// negative values that round to zero keep their sign.
pub(crate) fn round(x: f64) -> f64 {
    if x.is_nan() || x.is_infinite() || x == 0.0 {
        return x;
    }
    if (-0.5..0.0).contains(&x) {
        return -0.0;
    }
    let floor = x.floor();
    if x - floor >= 0.5 { floor + 1.0 } else { floor }
}

pub(crate) fn sum<N: XmlNode>(nodes: &NodeSetValue<N>) -> Result<f64> {
    let mut enm = nodes.enumerate()?;
    let mut total = 0.0;
    while let Some(n) = enm.next_node()? {
        total += string_to_number(&n.string_value());
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert_eq!(round(1.4999), 1.0);
        assert_eq!(round(0.5_f64.next_down()), 0.0);
        assert_eq!(round(4_503_599_627_370_497.0), 4_503_599_627_370_497.0);
        assert!(round(-0.3).is_sign_negative());
        assert_eq!(round(-0.3), 0.0);
        assert!(round(f64::NAN).is_nan());
        assert_eq!(round(f64::NEG_INFINITY), f64::NEG_INFINITY);
    }
}
