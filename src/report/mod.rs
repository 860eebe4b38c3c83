// Console reports for the CLI

use crossterm::style::Stylize;

use crate::config::{Config, Stage};
use crate::optimizer::evaluator::preview;
use crate::optimizer::{Evaluation, OptimizationResult, Outcome, QualityScore};
use crate::persistence::SavedPrompt;

const RULE_WIDTH: usize = 70;
const SHOWN_FAILURES: usize = 3;

fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

/// Settings that shape a run
pub fn render_settings(config: &Config, case_count: usize) -> String {
    let opt = &config.optimization;
    let perf = &config.performance;
    let mut out = format!(
        "{} Loaded {} test cases\n\n{}\n  • Max iterations: {}\n  • Target success rate: {}%\n  • Feedback frequency: every {} iterations\n  • Parallel: {} (workers: {}, batch: {})\n\n{}\n",
        "📊".bold(),
        case_count,
        "🔧 Optimization settings".bold(),
        opt.max_iterations,
        opt.target_success_rate,
        opt.feedback_frequency,
        if perf.enable_parallel { "on" } else { "off" },
        perf.max_workers,
        perf.batch_size,
        "🤖 Models".bold(),
    );
    for stage in Stage::ALL {
        let target = config.models.for_stage(stage);
        out.push_str(&format!(
            "  • {}: {}/{}\n",
            stage,
            target.provider,
            target.model.as_str().cyan()
        ));
    }
    out
}

/// End-of-run summary with the winning prompt
pub fn render_summary(result: &OptimizationResult) -> String {
    let headline = match result.outcome {
        Outcome::Converged { iteration } => format!(
            "{} Converged at iteration {}",
            "✓".green().bold(),
            iteration
        ),
        Outcome::Exhausted => format!(
            "{} Stopped after {} iterations without reaching the target",
            "⚠".yellow().bold(),
            result.iterations()
        ),
        Outcome::Cancelled => format!(
            "{} Cancelled after {} iterations; keeping the best prompt so far",
            "⚠".yellow().bold(),
            result.iterations()
        ),
    };

    let verdict = if result.final_success_rate() >= 100.0 {
        "🎉 Perfect golden prompt achieved!".green().to_string()
    } else if result.best_score.overall_quality >= 85.0 {
        "🏆 High-quality golden prompt achieved!".green().to_string()
    } else {
        "Optimization completed with room for improvement".yellow().to_string()
    };

    format!(
        "\n{headline}\n\
         Final quality score: {:.1}/100\n\
         Final success rate: {:.1}%\n\
         {verdict}\n\n\
         {}\n{}\n{}\n{}\n",
        result.best_score.overall_quality,
        result.final_success_rate(),
        "🏆 Golden prompt:".bold(),
        rule().dark_grey(),
        result.best,
        rule().dark_grey(),
    )
}

/// Scores from re-validating the saved prompt, plus a few failing cases.
pub fn render_validation(score: &QualityScore, evaluation: &Evaluation) -> String {
    let mut out = format!(
        "\n{}\n\
         Success rate: {}/{} ({:.1}%)\n\
         Overall quality score: {:.1}/100\n\
         Consistency score: {:.1}/100\n\
         Robustness score: {:.1}/100\n",
        "📊 Final results".bold(),
        evaluation.matches,
        evaluation.total,
        score.success_rate,
        score.overall_quality,
        score.consistency_score,
        score.robustness_score,
    );

    if !evaluation.failed.is_empty() {
        out.push_str(&format!(
            "\n{} {} cases still failing - consider manual review\n",
            "⚠".yellow(),
            evaluation.failed.len()
        ));
        for (i, failure) in evaluation.failed.iter().take(SHOWN_FAILURES).enumerate() {
            out.push_str(&format!(
                "  {}. Input: {} Expected: {} Got: {}\n",
                i + 1,
                preview(&failure.case.input, 30),
                preview(&failure.case.expected_output, 30),
                preview(&failure.actual_output.as_evidence(), 30),
            ));
        }
    }
    out
}

pub fn render_saved(saved: &SavedPrompt) -> String {
    format!(
        "\n{} Golden prompt saved to:\n  • {} (timestamped)\n  • {} (standard)\n  • {} (history)\n",
        "💾".bold(),
        saved.timestamped.display(),
        saved.standard.display(),
        saved.history.display()
    )
}
