//! `polnoise check` — grade the agreement between simulation and theory.

use std::time::Instant;

use super::SimulateArgs;

/// Run the check command. Exits with status 1 when the agreement score is
/// below `threshold`.
pub fn run(args: &SimulateArgs, threshold: f64) {
    let config = args.build_config().unwrap_or_else(|e| super::fail(e));

    println!(
        "Checking {} sample: {} samples of {} instance(s)...",
        config.combination, config.samples, config.sample_size
    );

    let t0 = Instant::now();
    let (_, report) = super::execute(args, &config, false).unwrap_or_else(|e| super::fail(e));
    let elapsed = t0.elapsed().as_secs_f64();

    let results = polnoise_tests::run_all_checks(&report);
    let score = polnoise_tests::calculate_agreement_score(&results);
    let passed = results.iter().filter(|r| r.passed).count();

    println!();
    println!("  {:<24} {:>6} {:>12} {:>12}  Details", "Check", "Grade", "p-value", "Statistic");
    println!("  {}", "-".repeat(78));
    for r in &results {
        let p = r
            .p_value
            .map(|p| format!("{p:.4}"))
            .unwrap_or_else(|| "-".to_string());
        let mark = if r.passed { "✓" } else { "✗" };
        println!(
            "  {mark} {:<22} {:>6} {:>12} {:>12.3}  {}",
            r.name, r.grade, p, r.statistic, r.details
        );
    }

    println!();
    println!(
        "  Score: {score:.0}/100 ({passed}/{} passed) [{elapsed:.1}s]",
        results.len()
    );

    if score < threshold {
        eprintln!("Agreement score {score:.0} is below the threshold {threshold:.0}");
        std::process::exit(1);
    }
}
