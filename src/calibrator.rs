//! Value transforms applied to a raw decoded number to produce a derived
//! value: polynomials, piecewise splines, and context-gated selection among
//! several calibrators.
//!
//! Spline bracket selection is pinned to `_zero_order_spline_interp` /
//! `_first_order_spline_interp` in the original implementation: the bracket
//! index is the position of the first point whose `raw` exceeds the query,
//! so order-0 returns the calibrated value one index below that, and
//! order-1 interpolates linearly between that index and the one before it.

use crate::error::{Error, Result};
use crate::match_criteria::MatchCriteria;
use crate::packet::Packet;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplinePoint {
    pub raw: f64,
    pub calibrated: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplineOrder {
    Zero,
    First,
}

#[derive(Debug, Clone)]
pub enum Calibrator {
    Polynomial {
        /// `(coefficient, exponent)`, order irrelevant, exponents need not
        /// be contiguous.
        terms: Vec<(f64, i32)>,
    },
    Spline {
        /// Always sorted by `raw` ascending at construction time.
        points: Vec<SplinePoint>,
        order: SplineOrder,
        extrapolate: bool,
    },
}

impl Calibrator {
    pub fn polynomial(mut terms: Vec<(f64, i32)>) -> Calibrator {
        terms.sort_by_key(|(_, exp)| *exp);
        Calibrator::Polynomial { terms }
    }

    pub fn spline(mut points: Vec<SplinePoint>, order: SplineOrder, extrapolate: bool) -> Calibrator {
        points.sort_by(|a, b| a.raw.partial_cmp(&b.raw).unwrap_or(std::cmp::Ordering::Equal));
        Calibrator::Spline {
            points,
            order,
            extrapolate,
        }
    }

    pub fn calibrate(&self, uncalibrated: f64) -> Result<f64> {
        match self {
            Calibrator::Polynomial { terms } => {
                Ok(terms.iter().map(|(a, n)| a * uncalibrated.powi(*n)).sum())
            }
            Calibrator::Spline {
                points,
                order,
                extrapolate,
            } => spline_interp(points, *order, *extrapolate, uncalibrated),
        }
    }
}

fn spline_interp(points: &[SplinePoint], order: SplineOrder, extrapolate: bool, query: f64) -> Result<f64> {
    if points.is_empty() {
        return Err(Error::Calibration("spline calibrator has no points".into()));
    }
    let min = points.first().unwrap().raw;
    let max = points.last().unwrap().raw;

    if min <= query && query <= max {
        // Index of the first point whose raw strictly exceeds the query.
        let first_greater = points
            .iter()
            .position(|p| p.raw > query)
            .unwrap_or(points.len());
        let lo = first_greater.saturating_sub(1);
        return match order {
            SplineOrder::Zero => Ok(points[lo].calibrated),
            SplineOrder::First => {
                let hi = first_greater.min(points.len() - 1);
                Ok(linear(query, points[lo], points[hi]))
            }
        };
    }
    if query > max && extrapolate {
        return match order {
            SplineOrder::Zero => Ok(points.last().unwrap().calibrated),
            SplineOrder::First => {
                if points.len() < 2 {
                    return Ok(points.last().unwrap().calibrated);
                }
                let n = points.len();
                Ok(linear(query, points[n - 2], points[n - 1]))
            }
        };
    }
    if query < min && extrapolate {
        return match order {
            SplineOrder::Zero => Ok(points.first().unwrap().calibrated),
            SplineOrder::First => {
                if points.len() < 2 {
                    return Ok(points.first().unwrap().calibrated);
                }
                Ok(linear(query, points[0], points[1]))
            }
        };
    }
    Err(Error::Calibration(format!(
        "query value {query} falls outside spline range [{min}, {max}] and extrapolate is false"
    )))
}

fn linear(xq: f64, p0: SplinePoint, p1: SplinePoint) -> f64 {
    let slope = (p1.calibrated - p0.calibrated) / (p1.raw - p0.raw);
    slope * (xq - p0.raw) + p0.calibrated
}

/// `{match_criteria, calibrator}`: used only when gated by context.
#[derive(Debug, Clone)]
pub struct ContextCalibrator {
    pub match_criteria: Vec<MatchCriteria>,
    pub calibrator: Calibrator,
}

/// Chooses among a list of context calibrators (first full match wins, in
/// declaration order), falling back to `default` and finally to the raw
/// value unchanged.
pub fn apply_calibration_chain(
    context_calibrators: &[ContextCalibrator],
    default: Option<&Calibrator>,
    raw: &Value,
    packet: &Packet,
) -> Result<Value> {
    let raw_f64 = match raw.as_f64() {
        Some(v) => v,
        None => return Ok(raw.clone()),
    };
    for cc in context_calibrators {
        if MatchCriteria::all_hold(&cc.match_criteria, packet, Some(raw))? {
            return Ok(Value::Float(cc.calibrator.calibrate(raw_f64)?));
        }
    }
    if let Some(cal) = default {
        return Ok(Value::Float(cal.calibrate(raw_f64)?));
    }
    Ok(raw.clone())
}
