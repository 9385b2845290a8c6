use crate::app::system::JobSystem;
use crate::config::{Args, Config, QuantityRequest};
use color_eyre::eyre::{eyre, Result, WrapErr};
use nalgebra::DMatrix;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;
use xcint::{
    functional_by_name, ExcVxc, ExcVxcUks, ExecutionSpace, ExxSettings, LoadBalancerFactory,
    LoadBalancerSettings, MolecularWeights, ProcessGroup, ReductionDriver, Scheduler, SerialGroup,
    TaskOrder, ThreadGroup, XcFunctional, XcIntegratorFactory,
};

/// Settings of one job after command-line overrides.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub functional: String,
    pub batch_size: usize,
    pub basis_tolerance: f64,
    pub num_threads: Option<usize>,
    pub task_order: TaskOrder,
    pub exx_tolerance: f64,
    pub size_adjustment: bool,
    pub ranks: usize,
    pub quantities: Vec<QuantityRequest>,
}

impl RunSettings {
    pub fn resolve(args: &Args, config: &Config) -> Self {
        let params = config.integrator_params();
        let defaults = LoadBalancerSettings::default();
        Self {
            functional: args.functional.clone().unwrap_or_else(|| config.functional_name()),
            batch_size: args.batch_size.or(params.batch_size).unwrap_or(defaults.batch_size),
            basis_tolerance: params.basis_tolerance.unwrap_or(defaults.basis_tolerance),
            num_threads: args.num_threads.or(params.num_threads),
            task_order: params.task_order.unwrap_or_default(),
            exx_tolerance: params
                .exx_tolerance
                .unwrap_or(ExxSettings::default().screening_tolerance),
            size_adjustment: params.size_adjustment.unwrap_or(true),
            ranks: args.ranks.or(params.ranks).unwrap_or(1),
            quantities: config.quantities.clone().unwrap_or_default(),
        }
    }

    fn wants(&self, quantity: QuantityRequest) -> bool {
        self.quantities.contains(&quantity)
    }
}

#[derive(Debug, Default)]
pub struct JobResults {
    pub electrons: Option<f64>,
    pub exc_vxc: Option<ExcVxc>,
    pub exc_vxc_uks: Option<ExcVxcUks>,
    pub gradient: Option<Vec<f64>>,
    pub exx: Option<DMatrix<f64>>,
    pub timings: Vec<(String, Duration)>,
}

/// Run the job on `settings.ranks` ranks and return the results of rank 0.
pub fn run_job(system: &JobSystem, settings: &RunSettings) -> Result<JobResults> {
    match settings.ranks {
        0 => Err(eyre!("The number of ranks must be positive")),
        1 => run_rank(Arc::new(SerialGroup), system, settings),
        n => run_threaded(n, system, settings),
    }
}

fn run_threaded(nranks: usize, system: &JobSystem, settings: &RunSettings) -> Result<JobResults> {
    info!("Running {} ranks as threads of this process", nranks);
    let outcomes: Vec<Result<JobResults>> = thread::scope(|s| {
        let handles: Vec<_> = ThreadGroup::create(nranks)
            .into_iter()
            .map(|group| s.spawn(move || run_rank(Arc::new(group), system, settings)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(eyre!("Rank thread panicked"))))
            .collect()
    });

    let mut root = None;
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        let results = outcome.wrap_err_with(|| format!("Rank {} failed", rank))?;
        if rank == 0 {
            root = Some(results);
        }
    }
    root.ok_or_else(|| eyre!("Rank 0 produced no results"))
}

fn run_rank<G>(group: Arc<G>, system: &JobSystem, settings: &RunSettings) -> Result<JobResults>
where
    G: ProcessGroup + ReductionDriver + 'static,
{
    let functional: Arc<dyn XcFunctional> = functional_by_name(&settings.functional)
        .map(Arc::<dyn XcFunctional>::from)
        .ok_or_else(|| eyre!("Unknown functional: {}", settings.functional))?;

    let lb_settings = LoadBalancerSettings {
        batch_size: settings.batch_size,
        basis_tolerance: settings.basis_tolerance,
    };
    let process_group: Arc<dyn ProcessGroup> = group.clone();
    let lb = LoadBalancerFactory::new(ExecutionSpace::Host, "default").get_instance(
        process_group,
        system.molecule.clone(),
        system.grid.clone(),
        system.basis.clone(),
        lb_settings,
    )?;
    let scheduler = Scheduler::new(settings.num_threads, settings.task_order)?;
    let reduction: Arc<dyn ReductionDriver> = group;
    let mut integrator = XcIntegratorFactory::new(ExecutionSpace::Host, "replicated", "reference")
        .get_instance(functional, lb, reduction, scheduler)?;

    MolecularWeights::new(settings.size_adjustment)
        .modify_weights(integrator.load_balancer_mut())
        .wrap_err("Failed to partition the grid weights")?;

    let p = &system.density;
    let mut results = JobResults::default();
    if settings.wants(QuantityRequest::Density) {
        results.electrons = Some(integrator.integrate_den(p).wrap_err("Density integration failed")?);
    }
    if settings.wants(QuantityRequest::ExcVxc) {
        results.exc_vxc = Some(integrator.eval_exc_vxc(p).wrap_err("Energy and potential failed")?);
    }
    if settings.wants(QuantityRequest::ExcVxcUks) {
        let pz = system
            .density_z
            .as_ref()
            .ok_or_else(|| eyre!("exc_vxc_uks needs density_matrix_z in the job file"))?;
        results.exc_vxc_uks = Some(
            integrator
                .eval_exc_vxc_uks(p, pz)
                .wrap_err("Unrestricted energy and potentials failed")?,
        );
    }
    if settings.wants(QuantityRequest::ExcGrad) {
        results.gradient = Some(integrator.eval_exc_grad(p).wrap_err("Nuclear gradient failed")?);
    }
    if settings.wants(QuantityRequest::Exx) {
        let exx_settings = ExxSettings {
            screening_tolerance: settings.exx_tolerance,
        };
        results.exx = Some(
            integrator
                .eval_exx(p, &exx_settings)
                .wrap_err("Exact exchange failed")?,
        );
    }

    results.timings = integrator
        .load_balancer()
        .timings()
        .iter()
        .chain(integrator.timings().iter())
        .map(|(name, d)| (name.to_string(), d))
        .collect();
    Ok(results)
}
