use crate::app::runner::JobResults;
use crate::app::system::JobSystem;
use crate::io::matrix_lines;
use tracing::{debug, info};

/// Matrices larger than this are only printed at debug level.
const MAX_PRINTED_NBF: usize = 12;

fn report_matrix(title: &str, m: &nalgebra::DMatrix<f64>) {
    if m.nrows() <= MAX_PRINTED_NBF {
        info!("{}:", title);
        for line in matrix_lines(m) {
            info!("  {}", line);
        }
    } else {
        debug!("{}:", title);
        for line in matrix_lines(m) {
            debug!("  {}", line);
        }
    }
}

pub fn report_results(system: &JobSystem, results: &JobResults) {
    info!("\nIntegration finished.");

    if let Some(n) = results.electrons {
        info!("Integrated electrons: {:.10}", n);
        let trace = system.density.dot(&::basis::integrals::overlap_matrix(&system.basis));
        info!("Tr(PS) for comparison: {:.10}", trace);
    }

    if let Some(exc_vxc) = &results.exc_vxc {
        info!("Exchange-correlation energy: {:.10} au", exc_vxc.exc);
        report_matrix("Exchange-correlation potential", &exc_vxc.vxc);
    }

    if let Some(uks) = &results.exc_vxc_uks {
        info!("Unrestricted exchange-correlation energy: {:.10} au", uks.exc);
        report_matrix("Scalar potential (Va + Vb) / 2", &uks.vxc_s);
        report_matrix("Z potential (Va - Vb) / 2", &uks.vxc_z);
    }

    if let Some(grad) = &results.gradient {
        info!("\nExchange-correlation gradient (Hartree/Bohr):");
        for (atom, g) in system.molecule.iter().zip(grad.chunks(3)) {
            info!(
                "  {:>2}: [{:+.8}, {:+.8}, {:+.8}]",
                atom.symbol, g[0], g[1], g[2]
            );
        }
    }

    if let Some(k) = &results.exx {
        info!("Exact exchange energy -1/4 Tr(PK): {:.10} au", -0.25 * system.density.dot(k));
        report_matrix("Exchange matrix K", k);
    }

    info!("\nTimings:");
    for (name, elapsed) in &results.timings {
        info!("  {:<28} {:>10.3?}", name, elapsed);
    }
}
