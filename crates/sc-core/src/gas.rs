//! Gas delta calculator
//!
//! Recomputes every savings figure from primary original/optimized values.
//! Model-reported percentages are advisory and never survive this pass.

use crate::model::{AnalysisReport, GasFunctionAnalysis, GasProvenance, RewriteReport};
use std::collections::HashMap;

/// Compute absolute and percentage savings from primary gas values.
///
/// Returns `(None, None)` when either side is missing; a zero original
/// yields an absolute delta but no percentage.
pub fn compute_savings(original: Option<u64>, optimized: Option<u64>) -> (Option<i64>, Option<f64>) {
    match (original, optimized) {
        (Some(orig), Some(opt)) => {
            let savings = orig as i64 - opt as i64;
            if orig > 0 {
                let percent = savings as f64 / orig as f64 * 100.0;
                (Some(savings), Some(percent))
            } else {
                (Some(savings), None)
            }
        }
        _ => (None, None),
    }
}

/// Merge compiler-derived and model-estimated per-function gas figures.
///
/// Compiler values always win field-by-field; model values only fill gaps.
/// Functions only the model knows about are kept with their `ai-estimate`
/// provenance.
pub fn merge_gas_estimates(
    compiler: Vec<GasFunctionAnalysis>,
    ai: Vec<GasFunctionAnalysis>,
) -> Vec<GasFunctionAnalysis> {
    let mut merged: Vec<GasFunctionAnalysis> = compiler;
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, g)| (g.function_name.clone(), i))
        .collect();

    for estimate in ai {
        match index.get(&estimate.function_name) {
            Some(&i) => {
                let entry = &mut merged[i];
                if entry.original_gas.is_none() {
                    entry.original_gas = estimate.original_gas;
                }
                if entry.optimized_gas.is_none() {
                    entry.optimized_gas = estimate.optimized_gas;
                }
            }
            None => {
                index.insert(estimate.function_name.clone(), merged.len());
                merged.push(GasFunctionAnalysis {
                    provenance: GasProvenance::AiEstimate,
                    ..estimate
                });
            }
        }
    }

    for entry in &mut merged {
        let (savings, percent) = compute_savings(entry.original_gas, entry.optimized_gas);
        entry.savings = savings;
        entry.savings_percent = percent;
    }

    merged
}

/// Finalize an analysis report: merge in compiler estimates and recompute
/// per-function and aggregate savings. Aggregates missing from the model
/// response are summed from per-function figures when those exist.
pub fn finalize_analysis(report: &mut AnalysisReport, compiler_estimates: Vec<GasFunctionAnalysis>) {
    let ai_estimates = std::mem::take(&mut report.gas_analysis);
    report.gas_analysis = merge_gas_estimates(compiler_estimates, ai_estimates);

    if report.original_gas.is_none() {
        report.original_gas = sum_present(report.gas_analysis.iter().map(|g| g.original_gas));
    }
    if report.optimized_gas.is_none() {
        report.optimized_gas = sum_present(report.gas_analysis.iter().map(|g| g.optimized_gas));
    }

    let (savings, percent) = compute_savings(report.original_gas, report.optimized_gas);
    report.savings = savings;
    report.savings_percent = percent;
}

/// Finalize a rewrite report: the aggregate delta is recomputed from its
/// primary values.
pub fn finalize_rewrite(report: &mut RewriteReport) {
    let (savings, percent) = compute_savings(report.gas.original_gas, report.gas.optimized_gas);
    report.gas.savings = savings;
    report.gas.savings_percent = percent;
}

fn sum_present<I: Iterator<Item = Option<u64>>>(values: I) -> Option<u64> {
    let mut total: u64 = 0;
    let mut seen = false;
    for v in values.flatten() {
        total = total.saturating_add(v);
        seen = true;
    }
    seen.then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn savings_recomputed_from_primary_values() {
        let (savings, percent) = compute_savings(Some(1000), Some(750));
        assert_eq!(savings, Some(250));
        assert!((percent.unwrap() - 25.0).abs() < EPSILON);
    }

    #[test]
    fn zero_original_yields_no_percentage() {
        let (savings, percent) = compute_savings(Some(0), Some(0));
        assert_eq!(savings, Some(0));
        assert!(percent.is_none());
    }

    #[test]
    fn missing_values_yield_nothing() {
        assert_eq!(compute_savings(None, Some(10)), (None, None));
        assert_eq!(compute_savings(Some(10), None), (None, None));
    }

    #[test]
    fn regression_is_negative_savings() {
        let (savings, percent) = compute_savings(Some(100), Some(150));
        assert_eq!(savings, Some(-50));
        assert!((percent.unwrap() + 50.0).abs() < EPSILON);
    }

    #[test]
    fn compiler_figures_are_never_overwritten() {
        let compiler = vec![GasFunctionAnalysis::compiler("transfer(address,uint256)", 21000)];
        let mut ai = GasFunctionAnalysis::ai_estimate("transfer(address,uint256)");
        ai.original_gas = Some(99999);
        ai.optimized_gas = Some(18000);

        let merged = merge_gas_estimates(compiler, vec![ai]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].provenance, GasProvenance::Compiler);
        // Compiler original wins, model fills the optimized gap.
        assert_eq!(merged[0].original_gas, Some(21000));
        assert_eq!(merged[0].optimized_gas, Some(18000));
        assert_eq!(merged[0].savings, Some(3000));
    }

    #[test]
    fn model_only_functions_keep_estimate_provenance() {
        let mut ai = GasFunctionAnalysis::ai_estimate("mint(uint256)");
        ai.original_gas = Some(50000);
        let merged = merge_gas_estimates(Vec::new(), vec![ai]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].provenance, GasProvenance::AiEstimate);
    }

    #[test]
    fn aggregate_falls_back_to_per_function_sums() {
        let mut report = AnalysisReport::default();
        let mut a = GasFunctionAnalysis::ai_estimate("a()");
        a.original_gas = Some(100);
        a.optimized_gas = Some(60);
        let mut b = GasFunctionAnalysis::ai_estimate("b()");
        b.original_gas = Some(300);
        b.optimized_gas = Some(140);
        report.gas_analysis = vec![a, b];

        finalize_analysis(&mut report, Vec::new());
        assert_eq!(report.original_gas, Some(400));
        assert_eq!(report.optimized_gas, Some(200));
        assert_eq!(report.savings, Some(200));
        assert!((report.savings_percent.unwrap() - 50.0).abs() < EPSILON);
    }

    #[test]
    fn advisory_percentages_are_discarded() {
        let mut report = RewriteReport::default();
        report.gas.original_gas = Some(200);
        report.gas.optimized_gas = Some(100);
        report.gas.savings_percent = Some(3.0); // bogus model arithmetic

        finalize_rewrite(&mut report);
        assert!((report.gas.savings_percent.unwrap() - 50.0).abs() < EPSILON);
        assert_eq!(report.gas.savings, Some(100));
    }
}
