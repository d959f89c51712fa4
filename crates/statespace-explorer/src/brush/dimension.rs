use serde::{Deserialize, Serialize};
use statespace_core::{AttrValue, AttributeMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Nominal,
    Boolean,
    Numeric,
}

impl DimensionKind {
    /// Kind declared by the attribute schema, if it names one we understand.
    pub fn from_schema(meta: &AttributeMeta) -> Option<Self> {
        match meta.kind.as_deref()? {
            "number" | "numeric" | "int" | "float" | "double" => Some(Self::Numeric),
            "boolean" | "bool" => Some(Self::Boolean),
            "string" | "nominal" | "enum" => Some(Self::Nominal),
            _ => None,
        }
    }

    /// Kind inferred from the values currently in the pane.
    pub fn infer<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Projected>,
    {
        let mut all_bool = true;
        let mut all_num = true;
        let mut any = false;
        for v in values {
            any = true;
            all_bool &= matches!(v, Projected::Bool(_));
            all_num &= matches!(v, Projected::Number(_));
        }
        match (any, all_bool, all_num) {
            (true, true, _) => Self::Boolean,
            (true, _, true) => Self::Numeric,
            _ => Self::Nominal,
        }
    }
}

/// A node's value on one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Projected {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Projected {
    /// Structured values (distributions and the like) do not project.
    pub fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Bool(b) => Some(Self::Bool(*b)),
            AttrValue::Number(n) if n.is_finite() => Some(Self::Number(*n)),
            AttrValue::Number(_) => None,
            AttrValue::Text(s) => Some(Self::Text(s.clone())),
            AttrValue::Other(_) => None,
        }
    }

    pub fn ordinal(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format!("{n}"),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Domain to normalized-position mapping, positions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scale {
    /// Inverted axis: `hi` sits at position 0, `lo` at 1.
    Linear { lo: f64, hi: f64 },
    /// Point scale with padding 1: value `i` of `n` sits at `(i + 1) / (n + 1)`.
    Point { values: Vec<String> },
}

/// Pixel selection mapped back into domain units.
#[derive(Debug, Clone, PartialEq)]
pub enum Inverted {
    Range(f64, f64),
    Values(Vec<String>),
}

impl Scale {
    /// Schema bounds when finite, data extent otherwise. A zero-width domain
    /// is widened by one and the domain always contains 0.
    pub fn numeric<I>(observed: I, meta: Option<&AttributeMeta>) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let (mut data_lo, mut data_hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for v in observed {
            data_lo = data_lo.min(v);
            data_hi = data_hi.max(v);
        }
        if data_lo > data_hi {
            data_lo = 0.0;
            data_hi = 0.0;
        }

        let mut lo = meta.and_then(AttributeMeta::finite_min).unwrap_or(data_lo);
        let mut hi = meta.and_then(AttributeMeta::finite_max).unwrap_or(data_hi);
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        if lo == hi {
            hi += 1.0;
        }
        Self::Linear {
            lo: lo.min(0.0),
            hi: hi.max(0.0),
        }
    }

    pub fn boolean() -> Self {
        Self::Point {
            values: vec!["false".to_string(), "true".to_string()],
        }
    }

    pub fn nominal(values: Vec<String>) -> Self {
        Self::Point { values }
    }

    pub fn position(&self, value: &Projected) -> Option<f64> {
        match self {
            Self::Linear { lo, hi } => {
                let v = value.ordinal()?;
                Some((hi - v) / (hi - lo))
            }
            Self::Point { values } => {
                let label = value.label();
                let i = values.iter().position(|v| *v == label)?;
                Some((i + 1) as f64 / (values.len() + 1) as f64)
            }
        }
    }

    /// Position of a domain number on a linear axis.
    pub fn position_of(&self, v: f64) -> Option<f64> {
        match self {
            Self::Linear { lo, hi } => Some((hi - v) / (hi - lo)),
            Self::Point { .. } => None,
        }
    }

    pub fn point_position(&self, label: &str) -> Option<f64> {
        match self {
            Self::Point { values } => {
                let i = values.iter().position(|v| v == label)?;
                Some((i + 1) as f64 / (values.len() + 1) as f64)
            }
            Self::Linear { .. } => None,
        }
    }

    /// Maps normalized positions `[a, b]` (any order) back to the domain.
    pub fn invert(&self, a: f64, b: f64) -> Inverted {
        let (p0, p1) = if a <= b { (a, b) } else { (b, a) };
        match self {
            Self::Linear { lo, hi } => {
                let span = hi - lo;
                Inverted::Range(hi - p1 * span, hi - p0 * span)
            }
            Self::Point { values } => {
                let n = (values.len() + 1) as f64;
                let picked = values
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| {
                        let p = (*i + 1) as f64 / n;
                        p >= p0 && p <= p1
                    })
                    .map(|(_, v)| v.clone())
                    .collect();
                Inverted::Values(picked)
            }
        }
    }

    pub fn domain(&self) -> Option<(f64, f64)> {
        match self {
            Self::Linear { lo, hi } => Some((*lo, *hi)),
            Self::Point { .. } => None,
        }
    }
}

/// Key of an attribute dimension, `category/name`. Unique within a pane even
/// when two categories share an attribute name.
pub fn dimension_key(category: &str, name: &str) -> String {
    format!("{category}/{name}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub category: String,
    pub kind: DimensionKind,
    pub scale: Scale,
}

impl Dimension {
    pub fn key(&self) -> String {
        dimension_key(&self.category, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_domain_includes_zero_and_inverts() {
        let scale = Scale::numeric([1.0, 3.0, 4.0, 6.0], None);
        assert_eq!(scale.domain(), Some((0.0, 6.0)));
        assert_eq!(scale.position(&Projected::Number(6.0)), Some(0.0));
        assert_eq!(scale.position(&Projected::Number(0.0)), Some(1.0));
    }

    #[test]
    fn numeric_domain_prefers_finite_schema_bounds() {
        let meta = AttributeMeta {
            kind: Some("number".to_string()),
            min: Some(serde_json::json!(-2)),
            max: Some(serde_json::json!("Infinity")),
            status: None,
        };
        let scale = Scale::numeric([1.0, 5.0], Some(&meta));
        assert_eq!(scale.domain(), Some((-2.0, 5.0)));
    }

    #[test]
    fn flat_domain_is_widened() {
        let scale = Scale::numeric([3.0, 3.0], None);
        assert_eq!(scale.domain(), Some((0.0, 4.0)));
    }

    #[test]
    fn point_scale_pads_both_ends() {
        let scale = Scale::nominal(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(scale.position(&Projected::Text("a".into())), Some(0.25));
        assert_eq!(scale.position(&Projected::Text("c".into())), Some(0.75));
        assert_eq!(
            scale.invert(0.7, 0.2),
            Inverted::Values(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn linear_inversion_respects_axis_direction() {
        let scale = Scale::Linear { lo: 0.0, hi: 10.0 };
        assert_eq!(scale.invert(0.2, 0.5), Inverted::Range(5.0, 8.0));
    }

    #[test]
    fn kind_inference() {
        let bools = [Projected::Bool(true), Projected::Bool(false)];
        let nums = [Projected::Number(1.0)];
        let mixed = [Projected::Number(1.0), Projected::Text("x".into())];
        assert_eq!(DimensionKind::infer(&bools), DimensionKind::Boolean);
        assert_eq!(DimensionKind::infer(&nums), DimensionKind::Numeric);
        assert_eq!(DimensionKind::infer(&mixed), DimensionKind::Nominal);
    }
}
