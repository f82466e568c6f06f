//! Evaluation metrics for binary risk scores.
//!
//! Labels are 0/1, probabilities in [0, 1]. Ranking metrics are undefined
//! (NaN) when only one class is present.

use serde::Serialize;

/// Probabilities are clipped to `[EPS, 1 - EPS]` before scoring.
pub const PROB_EPS: f64 = 1e-6;

/// Default top-K percentages for alert-style evaluation.
pub const DEFAULT_TOP_K: [u32; 4] = [1, 2, 5, 10];

fn clip(p: f64) -> f64 {
    p.clamp(PROB_EPS, 1.0 - PROB_EPS)
}

fn mean(v: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = v.fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

fn has_both_classes(y: &[f64]) -> bool {
    y.iter().any(|&v| v == 1.0) && y.iter().any(|&v| v != 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbMetrics {
    pub name: String,
    pub n: usize,
    pub pos_rate: f64,
    pub roc_auc: f64,
    pub pr_auc: f64,
    pub logloss: f64,
    pub brier: f64,
}

/// Area under the ROC curve via average ranks (ties share their mean rank).
pub fn roc_auc(y: &[f64], p: &[f64]) -> f64 {
    if !has_both_classes(y) {
        return f64::NAN;
    }
    let mut order: Vec<usize> = (0..p.len()).collect();
    order.sort_by(|&a, &b| p[a].total_cmp(&p[b]));

    let mut ranks = vec![0.0; p.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && p[order[j + 1]] == p[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = avg;
        }
        i = j + 1;
    }

    let n_pos = y.iter().filter(|&&v| v == 1.0).count() as f64;
    let n_neg = y.len() as f64 - n_pos;
    let rank_sum: f64 = ranks.iter().zip(y).filter(|(_, &v)| v == 1.0).map(|(r, _)| r).sum();
    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Average precision: Σ (R_k − R_{k−1}) · P_k over distinct score thresholds,
/// highest first.
pub fn average_precision(y: &[f64], p: &[f64]) -> f64 {
    if !has_both_classes(y) {
        return f64::NAN;
    }
    let mut order: Vec<usize> = (0..p.len()).collect();
    order.sort_by(|&a, &b| p[b].total_cmp(&p[a]));
    let total_pos = y.iter().filter(|&&v| v == 1.0).count() as f64;

    let (mut tp, mut seen) = (0.0, 0.0);
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let thr = p[order[i]];
        while i < order.len() && p[order[i]] == thr {
            if y[order[i]] == 1.0 {
                tp += 1.0;
            }
            seen += 1.0;
            i += 1;
        }
        let recall = tp / total_pos;
        ap += (recall - prev_recall) * (tp / seen);
        prev_recall = recall;
    }
    ap
}

/// n, positive rate, ROC AUC, average precision, log-loss and Brier score.
pub fn eval_probs(y: &[f64], p: &[f64], name: &str) -> ProbMetrics {
    let pc: Vec<f64> = p.iter().map(|&v| clip(v)).collect();
    let logloss = mean(
        y.iter()
            .zip(&pc)
            .map(|(&yi, &pi)| -(yi * pi.ln() + (1.0 - yi) * (1.0 - pi).ln())),
    );
    let brier = mean(y.iter().zip(&pc).map(|(&yi, &pi)| (pi - yi) * (pi - yi)));
    ProbMetrics {
        name: name.to_string(),
        n: y.len(),
        pos_rate: mean(y.iter().copied()),
        roc_auc: roc_auc(y, &pc),
        pr_auc: average_precision(y, &pc),
        logloss,
        brier,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdSummary {
    pub name: String,
    pub thr: f64,
    /// `[[tn, fp], [fn, tp]]`
    pub cm: [[usize; 2]; 2],
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tp: usize,
}

/// Confusion matrix and accuracy figures for predictions `p >= thr`.
pub fn summarize_at_threshold(y: &[f64], p: &[f64], thr: f64, name: &str) -> ThresholdSummary {
    let mut cm = [[0usize; 2]; 2];
    for (&yi, &pi) in y.iter().zip(p) {
        let actual = usize::from(yi == 1.0);
        let pred = usize::from(clip(pi) >= thr);
        cm[actual][pred] += 1;
    }
    let [[tn, fp], [fn_, tp]] = cm;
    let n = tn + fp + fn_ + tp;
    let accuracy = if n == 0 { f64::NAN } else { (tn + tp) as f64 / n as f64 };

    let recalls: Vec<f64> = [(tn, tn + fp), (tp, tp + fn_)]
        .into_iter()
        .filter(|&(_, support)| support > 0)
        .map(|(hit, support)| hit as f64 / support as f64)
        .collect();
    let balanced_accuracy = mean(recalls.into_iter());

    ThresholdSummary {
        name: name.to_string(),
        thr,
        cm,
        accuracy,
        balanced_accuracy,
        precision: tp as f64 / (tp + fp).max(1) as f64,
        recall: tp as f64 / (tp + fn_).max(1) as f64,
        tn,
        fp,
        fn_,
        tp,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopK {
    pub top_k_pct: u32,
    pub thr: f64,
    pub capture: f64,
    pub precision: f64,
}

/// Linear-interpolated quantile of `sorted` at `q` in [0, 1].
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Capture and precision when alerting on the top `k`% of scores.
pub fn topk_report(y: &[f64], p: &[f64], ks: &[u32]) -> Vec<TopK> {
    let mut sorted = p.to_vec();
    sorted.sort_by(f64::total_cmp);
    let total_pos = y.iter().filter(|&&v| v == 1.0).count().max(1) as f64;

    ks.iter()
        .map(|&k| {
            let thr = quantile(&sorted, 1.0 - f64::from(k) / 100.0);
            let (selected, hits) = y
                .iter()
                .zip(p)
                .filter(|(_, &pi)| pi >= thr)
                .fold((0usize, 0usize), |(s, h), (&yi, _)| (s + 1, h + usize::from(yi == 1.0)));
            TopK {
                top_k_pct: k,
                thr,
                capture: hits as f64 / total_pos,
                precision: if selected == 0 { 0.0 } else { hits as f64 / selected as f64 },
            }
        })
        .collect()
}
