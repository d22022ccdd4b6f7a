//! Pointwise AST evaluation over an aligned frame, plus output rebasing.

use std::collections::HashMap;

use crate::error::{AppError, Result};
use crate::expr::align::AlignedFrame;
use crate::expr::{BinOp, Expr};
use crate::models::{Point, Series, SymbolToken, Unit};

/// Output rebasing selected by the `norm` request field: 0 means percent
/// change from the first defined value, any other K indexes the series to K
/// at its first defined value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormMode {
    PercentChange,
    IndexTo(f64),
}

impl NormMode {
    pub fn from_param(norm: f64) -> Self {
        if norm == 0.0 {
            NormMode::PercentChange
        } else {
            NormMode::IndexTo(norm)
        }
    }
}

/// Evaluate the AST against aligned leg columns. Any undefined operand at a
/// timestamp makes the result undefined there; division by zero is
/// undefined, never an error.
pub fn evaluate(
    ast: &Expr,
    frame: &AlignedFrame,
    leaf_order: &[SymbolToken],
    label: impl Into<String>,
) -> Result<Series> {
    let positions: HashMap<&SymbolToken, usize> =
        leaf_order.iter().enumerate().map(|(i, t)| (t, i)).collect();

    let mut points = Vec::with_capacity(frame.index.len());
    for row in 0..frame.index.len() {
        let value = eval_node(ast, frame, &positions, row)?;
        points.push(Point { t: frame.index[row], v: value });
    }

    Ok(Series::with_points(label, Unit::Price, points))
}

fn eval_node(
    node: &Expr,
    frame: &AlignedFrame,
    positions: &HashMap<&SymbolToken, usize>,
    row: usize,
) -> Result<Option<f64>> {
    match node {
        Expr::Number(value) => Ok(Some(*value)),
        Expr::Leaf(token) => {
            let column = positions.get(token).ok_or_else(|| {
                AppError::Invariant(format!("leaf {} missing from aligned frame", token))
            })?;
            Ok(frame.columns[*column][row])
        }
        Expr::Binary { op, lhs, rhs } => {
            let left = eval_node(lhs, frame, positions, row)?;
            let right = eval_node(rhs, frame, positions, row)?;
            Ok(match (left, right) {
                (Some(a), Some(b)) => match op {
                    BinOp::Add => Some(a + b),
                    BinOp::Sub => Some(a - b),
                    BinOp::Mul => Some(a * b),
                    BinOp::Div => {
                        if b == 0.0 {
                            None
                        } else {
                            Some(a / b)
                        }
                    }
                },
                _ => None,
            })
        }
    }
}

/// Rebase a series after evaluation. The anchor is the first defined value.
pub fn normalize(series: Series, mode: NormMode) -> Series {
    let Some((_, anchor)) = series
        .points
        .iter()
        .find_map(|p| p.v.map(|v| (p.t, v)))
        .filter(|(_, v)| *v != 0.0)
    else {
        return series;
    };

    let (unit, map): (Unit, Box<dyn Fn(f64) -> f64>) = match mode {
        NormMode::PercentChange => (Unit::Percent, Box::new(move |v| (v / anchor - 1.0) * 100.0)),
        NormMode::IndexTo(base) => (Unit::Ratio, Box::new(move |v| v / anchor * base)),
    };

    let points = series
        .points
        .iter()
        .map(|p| Point { t: p.t, v: p.v.map(&map) })
        .collect();

    let mut out = Series::with_points(series.label.clone(), unit, points);
    out.expr = series.expr;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::align::{align, AlignMode};
    use crate::expr::parse;
    use crate::models::Unit;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, day, 0, 0, 0).unwrap()
    }

    fn leg(label: &str, days: &[(u32, f64)]) -> Series {
        Series::with_points(
            label,
            Unit::Price,
            days.iter().map(|&(d, v)| Point { t: ts(d), v: Some(v) }).collect(),
        )
    }

    fn eval_expr(input: &str, legs: Vec<Series>) -> Series {
        let ast = parse(input).unwrap();
        let leaves = ast.leaves();
        let frame = align(&legs, AlignMode::Union, 5);
        evaluate(&ast, &frame, &leaves, input).unwrap()
    }

    #[test]
    fn sum_matches_leg_closes_pointwise() {
        let out = eval_expr(
            "EQ:AAPL+EQ:MSFT",
            vec![
                leg("EQ:AAPL", &[(1, 10.0), (2, 11.0)]),
                leg("EQ:MSFT", &[(1, 100.0), (2, 101.0)]),
            ],
        );
        assert_eq!(out.values(), vec![Some(110.0), Some(112.0)]);
    }

    #[test]
    fn division_by_zero_is_a_gap_not_an_error() {
        let out = eval_expr(
            "EQ:A/EQ:B",
            vec![
                leg("EQ:A", &[(1, 10.0), (2, 20.0)]),
                leg("EQ:B", &[(1, 2.0), (2, 0.0)]),
            ],
        );
        assert_eq!(out.values(), vec![Some(5.0), None]);
    }

    #[test]
    fn undefined_operand_propagates() {
        // B starts on day 2; day 1 has no carry source, so the sum is
        // undefined there.
        let out = eval_expr(
            "EQ:A+EQ:B",
            vec![
                leg("EQ:A", &[(1, 1.0), (2, 2.0)]),
                leg("EQ:B", &[(2, 20.0)]),
            ],
        );
        assert_eq!(out.values(), vec![None, Some(22.0)]);
    }

    #[test]
    fn constants_broadcast_over_the_grid() {
        let out = eval_expr("(EQ:A+EQ:B)/2", vec![
            leg("EQ:A", &[(1, 10.0)]),
            leg("EQ:B", &[(1, 20.0)]),
        ]);
        assert_eq!(out.values(), vec![Some(15.0)]);
    }

    #[test]
    fn percent_norm_rebases_at_first_defined() {
        let series = leg("x", &[(1, 50.0), (2, 55.0), (3, 45.0)]);
        let out = normalize(series, NormMode::PercentChange);
        assert_eq!(out.unit, Unit::Percent);
        let values: Vec<f64> = out.values().into_iter().flatten().collect();
        assert!((values[0] - 0.0).abs() < 1e-12);
        assert!((values[1] - 10.0).abs() < 1e-12);
        assert!((values[2] + 10.0).abs() < 1e-12);
    }

    #[test]
    fn index_norm_rebases_to_base() {
        let series = leg("x", &[(1, 50.0), (2, 75.0)]);
        let out = normalize(series, NormMode::IndexTo(100.0));
        let values: Vec<f64> = out.values().into_iter().flatten().collect();
        assert_eq!(values, vec![100.0, 150.0]);
    }

    #[test]
    fn norm_with_leading_gap_anchors_at_first_defined() {
        let series = Series::with_points(
            "x",
            Unit::Price,
            vec![
                Point { t: ts(1), v: None },
                Point { t: ts(2), v: Some(200.0) },
                Point { t: ts(3), v: Some(220.0) },
            ],
        );
        let out = normalize(series, NormMode::IndexTo(100.0));
        assert_eq!(out.values(), vec![None, Some(100.0), Some(110.0)]);
    }
}
