//! Executes an analysis script against the live table and plotting surface.
//!
//! The script sees exactly two bindings: `df`, a per-turn clone of the
//! uploaded frame, and `plt`, a fresh plotting surface. Nothing else from
//! the host process is reachable. Any failure during execution is caught
//! and becomes the outcome's output text; a turn is still recorded for it.
//! There is no time or memory limit on a script, so this sandbox is only
//! suitable for a single trusted user.

use log::{debug, error};
use polars::prelude::*;

use crate::models::turn::ExecutionOutcome;
use crate::services::figure::{default_bins, ChartData, PlotSurface};
use crate::services::script::{
    self, AggFunc, CmpOp, Expr, FrameExpr, Literal, PlotStmt, ScalarExpr, Stmt,
};

/// Run generated code against a clone of the uploaded table. Never fails:
/// errors are contained in the outcome. The plotting surface is drained on
/// every exit path.
pub fn run(source: &DataFrame, code: &str) -> ExecutionOutcome {
    let mut surface = PlotSurface::new();
    let mut output = String::new();

    match execute(source, code, &mut surface, &mut output) {
        Ok(()) => match surface.capture() {
            Ok(figure) => ExecutionOutcome { output, figure },
            Err(e) => {
                error!("Chart rendering failed: {}", e);
                ExecutionOutcome {
                    output: error_text(&e.to_string()),
                    figure: None,
                }
            }
        },
        Err(message) => {
            surface.clear();
            debug!("Generated code failed: {}", message);
            ExecutionOutcome {
                output: error_text(&message),
                figure: None,
            }
        }
    }
}

fn error_text(message: &str) -> String {
    format!("Error executing generated code: {}", message)
}

fn execute(
    source: &DataFrame,
    code: &str,
    surface: &mut PlotSurface,
    output: &mut String,
) -> Result<(), String> {
    let stmts = script::parse_script(code).map_err(|e| e.to_string())?;

    // Rebindings stay local to this execution; the session's source table
    // is untouched between turns.
    let mut df = source.clone();

    for stmt in stmts {
        match stmt {
            Stmt::Print(expr) => {
                let rendered = match expr {
                    Expr::Str(s) => s,
                    Expr::Num(n) => format_number(n),
                    Expr::Frame(frame) => {
                        let result = eval_frame(&df, &frame)?;
                        format!("{}", result)
                    }
                    Expr::Scalar(scalar) => eval_scalar(&df, &scalar)?,
                };
                output.push_str(&rendered);
                output.push('\n');
            }
            Stmt::Assign(frame) => {
                df = eval_frame(&df, &frame)?;
            }
            Stmt::Plot(plot) => eval_plot(&df, &plot, surface)?,
        }
    }
    Ok(())
}

fn eval_frame(df: &DataFrame, expr: &FrameExpr) -> Result<DataFrame, String> {
    match expr {
        FrameExpr::Source => Ok(df.clone()),
        FrameExpr::Filter {
            inner,
            column,
            op,
            value,
        } => {
            let frame = eval_frame(df, inner)?;
            require_column(&frame, column)?;
            let value_expr = match value {
                Literal::Num(n) => lit(*n),
                Literal::Str(s) => lit(s.clone()),
            };
            let predicate = match op {
                CmpOp::Eq => col(column).eq(value_expr),
                CmpOp::Ne => col(column).neq(value_expr),
                CmpOp::Gt => col(column).gt(value_expr),
                CmpOp::Lt => col(column).lt(value_expr),
                CmpOp::Ge => col(column).gt_eq(value_expr),
                CmpOp::Le => col(column).lt_eq(value_expr),
            };
            frame
                .lazy()
                .filter(predicate)
                .collect()
                .map_err(|e| e.to_string())
        }
        FrameExpr::Sort {
            inner,
            column,
            descending,
        } => {
            let frame = eval_frame(df, inner)?;
            require_column(&frame, column)?;
            frame
                .sort([column.as_str()], vec![*descending], false)
                .map_err(|e| e.to_string())
        }
        FrameExpr::Select { inner, columns } => {
            let frame = eval_frame(df, inner)?;
            let names: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
            frame.select(names).map_err(|e| e.to_string())
        }
        FrameExpr::Head { inner, rows } => {
            let frame = eval_frame(df, inner)?;
            Ok(frame.head(Some(*rows)))
        }
        FrameExpr::GroupCount { inner, by } => {
            let frame = eval_frame(df, inner)?;
            require_column(&frame, by)?;
            frame
                .lazy()
                .group_by_stable([col(by)])
                .agg([col(by).count().alias(&format!("count_{}", by))])
                .collect()
                .map_err(|e| e.to_string())
        }
        FrameExpr::GroupAgg {
            inner,
            by,
            func,
            column,
        } => {
            let frame = eval_frame(df, inner)?;
            require_column(&frame, by)?;
            require_column(&frame, column)?;
            let agg_expr = match func {
                AggFunc::Mean => col(column).mean(),
                AggFunc::Sum => col(column).sum(),
                AggFunc::Min => col(column).min(),
                AggFunc::Max => col(column).max(),
                AggFunc::Median => col(column).median(),
                AggFunc::Std => col(column).std(1),
            };
            frame
                .lazy()
                .group_by_stable([col(by)])
                .agg([agg_expr.alias(&format!("{}_{}", func.name(), column))])
                .collect()
                .map_err(|e| e.to_string())
        }
    }
}

fn eval_scalar(df: &DataFrame, expr: &ScalarExpr) -> Result<String, String> {
    match expr {
        ScalarExpr::Count(inner) => {
            let frame = eval_frame(df, inner)?;
            Ok(frame.height().to_string())
        }
        ScalarExpr::Shape(inner) => {
            let frame = eval_frame(df, inner)?;
            Ok(format!("({}, {})", frame.height(), frame.width()))
        }
        ScalarExpr::Columns(inner) => {
            let frame = eval_frame(df, inner)?;
            let names: Vec<String> = frame
                .get_column_names()
                .iter()
                .map(|n| format!("\"{}\"", n))
                .collect();
            Ok(format!("[{}]", names.join(", ")))
        }
        ScalarExpr::Agg {
            inner,
            func,
            column,
        } => {
            let frame = eval_frame(df, inner)?;
            let values = numeric_column(&frame, column)?;
            let result = match func {
                AggFunc::Mean => values.mean(),
                AggFunc::Sum => Some(values.sum().unwrap_or(0.0)),
                AggFunc::Min => values.min(),
                AggFunc::Max => values.max(),
                AggFunc::Median => values.median(),
                AggFunc::Std => values.std(1),
            };
            match result {
                Some(v) => Ok(format_number(v)),
                None => Err(format!(
                    "{} of column \"{}\" is undefined (no numeric values)",
                    func.name(),
                    column
                )),
            }
        }
    }
}

fn eval_plot(df: &DataFrame, plot: &PlotStmt, surface: &mut PlotSurface) -> Result<(), String> {
    match plot {
        PlotStmt::Bar {
            label_col,
            value_col,
        } => {
            let labels = label_column(df, label_col)?;
            let values = numeric_values(df, value_col)?;
            let pairs: Vec<(String, f64)> = labels.into_iter().zip(values).collect();
            surface.draw(ChartData::Bar {
                labels: pairs.iter().map(|(l, _)| l.clone()).collect(),
                values: pairs.iter().map(|(_, v)| *v).collect(),
            });
        }
        PlotStmt::Line { x_col, y_col } => {
            let xs = numeric_values(df, x_col)?;
            let ys = numeric_values(df, y_col)?;
            surface.draw(ChartData::Line { xs, ys });
        }
        PlotStmt::Scatter { x_col, y_col } => {
            let xs = numeric_values(df, x_col)?;
            let ys = numeric_values(df, y_col)?;
            surface.draw(ChartData::Scatter { xs, ys });
        }
        PlotStmt::Hist { col, bins } => {
            let values = numeric_values(df, col)?;
            surface.draw(ChartData::Histogram {
                values,
                bins: bins.unwrap_or_else(default_bins),
            });
        }
        PlotStmt::Title(text) => surface.set_title(text.clone()),
    }
    Ok(())
}

fn require_column(df: &DataFrame, name: &str) -> Result<(), String> {
    if df.get_column_names().contains(&name) {
        Ok(())
    } else {
        Err(format!("unknown column \"{}\"", name))
    }
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Float64Chunked, String> {
    let series = df
        .column(name)
        .map_err(|_| format!("unknown column \"{}\"", name))?;
    let cast = series
        .cast(&DataType::Float64)
        .map_err(|_| format!("column \"{}\" is not numeric", name))?;
    cast.f64()
        .map(|ca| ca.clone())
        .map_err(|_| format!("column \"{}\" is not numeric", name))
}

/// Non-null numeric values of a column, in row order.
fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<f64>, String> {
    let ca = numeric_column(df, name)?;
    Ok(ca.into_iter().flatten().collect())
}

/// Labels for bar charts: any column rendered as text, nulls included as
/// empty strings to keep alignment with the value column.
fn label_column(df: &DataFrame, name: &str) -> Result<Vec<String>, String> {
    let series = df
        .column(name)
        .map_err(|_| format!("unknown column \"{}\"", name))?;
    let cast = series
        .cast(&DataType::Utf8)
        .map_err(|_| format!("column \"{}\" cannot be used as labels", name))?;
    let ca = cast
        .utf8()
        .map_err(|_| format!("column \"{}\" cannot be used as labels", name))?;
    Ok(ca
        .into_iter()
        .map(|v| v.unwrap_or("").to_string())
        .collect())
}

fn format_number(v: f64) -> String {
    format!("{}", v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> DataFrame {
        DataFrame::new(vec![
            Series::new("name", &["ann", "bob", "cid", "dee"]),
            Series::new("age", &[30i64, 40, 50, 60]),
            Series::new("city", &["x", "y", "x", "y"]),
        ])
        .unwrap()
    }

    #[test]
    fn text_output_without_figure() {
        let outcome = run(&people(), "print(df.mean(\"age\"))");
        assert_eq!(outcome.output, "45\n");
        assert!(outcome.figure.is_none());
    }

    #[test]
    fn figure_without_text_output() {
        let outcome = run(&people(), "plt.bar(\"name\", \"age\")");
        assert!(outcome.output.is_empty());
        let figure = outcome.figure.expect("bar chart should be captured");
        assert_eq!(figure.chart_type, "bar");
    }

    #[test]
    fn errors_are_caught_into_output() {
        let outcome = run(&people(), "print(df.mean(\"salary\"))");
        assert!(outcome.output.contains("Error executing generated code"));
        assert!(outcome.output.contains("salary"));
        assert!(outcome.figure.is_none());
    }

    #[test]
    fn filter_and_chained_aggregates() {
        let outcome = run(
            &people(),
            "print(df.filter(\"age\", \">\", 35).count())\nprint(df.filter(\"city\", \"==\", \"x\").mean(\"age\"))",
        );
        assert_eq!(outcome.output, "3\n40\n");
    }

    #[test]
    fn rebinding_is_local_to_the_run() {
        let source = people();
        let outcome = run(&source, "df = df.head(1)\nprint(df.count())");
        assert_eq!(outcome.output, "1\n");
        // The caller's frame is untouched by the rebinding.
        assert_eq!(source.height(), 4);
    }

    #[test]
    fn last_figure_wins_and_nothing_leaks_between_runs() {
        let outcome = run(
            &people(),
            "plt.line(\"age\", \"age\")\nplt.bar(\"name\", \"age\")\nplt.title(\"ages\")",
        );
        let figure = outcome.figure.expect("a figure should be captured");
        assert_eq!(figure.chart_type, "bar");
        assert_eq!(figure.title.as_deref(), Some("ages"));

        // A following figure-less run captures nothing.
        let next = run(&people(), "print(\"no chart\")");
        assert!(next.figure.is_none());
        assert_eq!(next.output, "no chart\n");
    }

    #[test]
    fn mixed_output_order_is_preserved() {
        let outcome = run(
            &people(),
            "print(\"first\")\nprint(df.shape())\nprint(df.columns())",
        );
        assert_eq!(
            outcome.output,
            "first\n(4, 3)\n[\"name\", \"age\", \"city\"]\n"
        );
    }

    #[test]
    fn group_aggregates_produce_frames() {
        let outcome = run(&people(), "print(df.group_mean(\"city\", \"age\").count())");
        assert_eq!(outcome.output, "2\n");
    }
}
