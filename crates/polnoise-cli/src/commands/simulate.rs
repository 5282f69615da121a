//! `polnoise simulate` — draw samples and compare their moments with theory.

use log::info;

use super::SimulateArgs;

/// Run the simulate command.
pub fn run(args: &SimulateArgs, theory_only: bool, moments: bool) {
    let config = args.build_config().unwrap_or_else(|e| super::fail(e));
    info!("configuration: {} x {} ({})", config.samples, config.sample_size, config.combination);

    let (graph, report) = super::execute(args, &config, theory_only).unwrap_or_else(|e| super::fail(e));
    super::print_report(&report, moments);

    if let Some(coordinator) = &graph.coordinator {
        println!(
            "  covariant modulation: requested ρ={:.4}, range [{:.4}, {:.4}]",
            coordinator.correlation(),
            coordinator.min_correlation(),
            coordinator.max_correlation()
        );
        if let Some(rho) = coordinator.measured_correlation() {
            println!("  measured ρ={rho:.4} over {} pairs", coordinator.pairs_drawn());
        }
        println!();
    }

    info!("{} Gaussian deviates drawn", graph.normal.borrow().draws());
}
