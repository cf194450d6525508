//! Runtime image allocator shared by device workers.
//!
//! Lifecycle:
//! 1. build from labels and devices ([`ImageAllocator::new`] / [`ImageAllocator::from_pool`]);
//! 2. run [`ImageAllocator::compute_initial_allocation`] exactly once, single-threaded;
//! 3. share the allocator (`Arc`) with one worker per device, each calling
//!    [`ImageAllocator::allocate`] whenever its device is idle until it returns `None`.
mod state;

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use mim_model::{Device, DeviceId, Label, LabelId, PoolSpec};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::CoreError,
    ledger::AllocationLedger,
    matrix::{CellState, CompatibilityMatrix},
    metrics::{MetricsHandle, SolveOutcome, noop_metrics},
    pending::PendingWork,
    solver::InitialAllocationSolver,
};
use state::AllocationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unsolved,
    Ready { bound: usize },
    Unsatisfiable,
}

/// Decides which label each device should be flashed with next.
///
/// The compatibility matrix and the allocation ledger live behind a single
/// mutex, so every `allocate` call is atomic with respect to the others.
pub struct ImageAllocator {
    labels: Vec<Label>,
    devices: Vec<Device>,
    phase: Phase,
    state: Mutex<AllocationState>,
    metrics: MetricsHandle,
}

impl ImageAllocator {
    /// Build the allocator and its compatibility matrix.
    ///
    /// Ordinals of the returned [`LabelId`] / [`DeviceId`] handles follow the
    /// order of the given lists.
    pub fn new(labels: Vec<Label>, devices: Vec<Device>) -> Self {
        let matrix = CompatibilityMatrix::new(&labels, &devices);
        Self {
            labels,
            devices,
            phase: Phase::Unsolved,
            state: Mutex::new(AllocationState::new(matrix)),
            metrics: noop_metrics(),
        }
    }

    /// Validate a pool description and build the allocator from it.
    pub fn from_pool(pool: &PoolSpec) -> Result<Self, CoreError> {
        pool.validate()?;
        Ok(Self::new(pool.labels.clone(), pool.devices.clone()))
    }

    /// Replace the metrics backend.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// # Panics
    /// If `id` does not belong to this allocator.
    pub fn label(&self, id: LabelId) -> &Label {
        self.labels
            .get(id.ordinal())
            .unwrap_or_else(|| panic!("unknown {id} (pool has {} labels)", self.labels.len()))
    }

    /// # Panics
    /// If `id` does not belong to this allocator.
    pub fn device(&self, id: DeviceId) -> &Device {
        self.devices
            .get(id.ordinal())
            .unwrap_or_else(|| panic!("unknown {id} (pool has {} devices)", self.devices.len()))
    }

    pub fn label_id(&self, name: &str) -> Option<LabelId> {
        self.labels
            .iter()
            .position(|l| l.name() == name)
            .map(LabelId::new)
    }

    pub fn device_id(&self, name: &str) -> Option<DeviceId> {
        self.devices
            .iter()
            .position(|d| d.name() == name)
            .map(DeviceId::new)
    }

    /// Per-device reimage bound found by the initial search, once it succeeded.
    pub fn reimage_bound(&self) -> Option<usize> {
        match self.phase {
            Phase::Ready { bound } => Some(bound),
            _ => None,
        }
    }

    /// Names of labels that are not compatible with any device of the pool.
    pub fn unreachable_labels(&self) -> Vec<String> {
        self.labels
            .iter()
            .filter(|l| !self.devices.iter().any(|d| l.accepts(d)))
            .map(|l| l.name().to_string())
            .collect()
    }

    /// Pre-plan a minimal number of reimages per device so that every label is
    /// scheduled at least once.
    ///
    /// Returns `false` when some label is not compatible with any device; the
    /// allocator must not be used for allocation afterwards.
    ///
    /// # Panics
    /// If called more than once.
    #[instrument(level = "debug", skip(self), fields(labels = self.labels.len(), devices = self.devices.len()))]
    pub fn compute_initial_allocation(&mut self) -> bool {
        assert_eq!(
            self.phase,
            Phase::Unsolved,
            "initial allocation must be computed exactly once"
        );

        let started = Instant::now();
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let bound = InitialAllocationSolver::new(&mut state.matrix).solve();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match bound {
            Some(bound) => {
                info!(bound, elapsed_ms, "initial allocation computed");
                debug!("allocation matrix:\n{}", state.matrix);
                self.metrics
                    .record_initial_allocation(SolveOutcome::Solved, bound, elapsed_ms);
                self.phase = Phase::Ready { bound };
                true
            }
            None => {
                warn!(
                    labels = ?self.unreachable_labels(),
                    "no initial allocation covers every label"
                );
                self.metrics
                    .record_initial_allocation(SolveOutcome::Unsatisfiable, 0, elapsed_ms);
                self.phase = Phase::Unsatisfiable;
                false
            }
        }
    }

    /// [`compute_initial_allocation`](Self::compute_initial_allocation) as a `Result`.
    ///
    /// Returns the reimage bound, or [`CoreError::Unsatisfiable`] naming every
    /// label that has no compatible device.
    pub fn initialize(&mut self) -> Result<usize, CoreError> {
        self.compute_initial_allocation();
        match self.phase {
            Phase::Ready { bound } => Ok(bound),
            _ => Err(CoreError::Unsatisfiable {
                labels: self.unreachable_labels(),
            }),
        }
    }

    /// Next label for `device`, or `None` when the device may shut down.
    ///
    /// Every label is treated as having pending work.
    ///
    /// # Panics
    /// If the initial allocation has not succeeded, or `device` is not part of the pool.
    pub fn allocate(&self, device: DeviceId) -> Option<LabelId> {
        self.allocate_inner(device, None)
    }

    /// Like [`allocate`](Self::allocate), skipping greedy candidates whose
    /// pending work count is zero and preferring labels with more work left.
    pub fn allocate_with(&self, device: DeviceId, pending: &dyn PendingWork) -> Option<LabelId> {
        self.allocate_inner(device, Some(pending))
    }

    #[instrument(level = "debug", skip(self, pending))]
    fn allocate_inner(
        &self,
        device: DeviceId,
        pending: Option<&dyn PendingWork>,
    ) -> Option<LabelId> {
        match self.phase {
            Phase::Ready { .. } => {}
            Phase::Unsolved => panic!("allocate called before compute_initial_allocation"),
            Phase::Unsatisfiable => {
                panic!("allocate called after an unsatisfiable initial allocation")
            }
        }
        let device_name = self.device(device).name();

        let taken = self.lock().take(device, pending);
        match taken {
            Some((label, source)) => {
                let name = self.label(label).name();
                debug!(label = name, source = source.as_label(), "label allocated");
                self.metrics.record_allocation(name, source);
                Some(label)
            }
            None => {
                debug!("no more labels for device");
                self.metrics.record_exhausted(device_name);
                None
            }
        }
    }

    /// Current state of a single cell.
    pub fn cell(&self, label: LabelId, device: DeviceId) -> CellState {
        self.lock().matrix.get(label, device)
    }

    /// Snapshot of the allocation history.
    pub fn ledger(&self) -> AllocationLedger {
        self.lock().ledger.clone()
    }

    /// Number of devices assigned `label` so far.
    pub fn reimage_count(&self, label: LabelId) -> usize {
        self.lock().ledger.reimage_count(label)
    }

    /// Text rendering of the compatibility matrix, one line per label.
    pub fn render_matrix(&self) -> String {
        self.lock().matrix.to_string()
    }

    fn lock(&self) -> MutexGuard<'_, AllocationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, HashSet},
        sync::{Arc, Mutex as StdMutex},
        thread,
    };

    use proptest::prelude::*;

    use super::*;
    use crate::{ledger::AllocationSource, metrics::MetricsBackend};

    fn devices(n: usize) -> Vec<Device> {
        (1..=n).map(|i| Device::new(format!("d{i}"))).collect()
    }

    fn ready(labels: Vec<Label>, devices: Vec<Device>) -> ImageAllocator {
        let mut alloc = ImageAllocator::new(labels, devices);
        assert!(alloc.compute_initial_allocation());
        alloc
    }

    fn id(alloc: &ImageAllocator, name: &str) -> DeviceId {
        alloc.device_id(name).unwrap()
    }

    fn name(alloc: &ImageAllocator, label: Option<LabelId>) -> Option<&str> {
        label.map(|l| alloc.label(l).name())
    }

    #[test]
    fn one_device_gets_labels_in_ordinal_order() {
        let alloc = ready(
            vec![Label::new("l1"), Label::new("l2"), Label::new("l3")],
            devices(1),
        );
        let d1 = id(&alloc, "d1");

        assert_eq!(name(&alloc, alloc.allocate(d1)), Some("l1"));
        assert_eq!(name(&alloc, alloc.allocate(d1)), Some("l2"));
        assert_eq!(name(&alloc, alloc.allocate(d1)), Some("l3"));
        assert_eq!(alloc.allocate(d1), None);
    }

    #[test]
    fn restricted_labels_go_to_their_devices() {
        let alloc = ready(
            vec![
                Label::restricted_to("l1", ["d1"]),
                Label::restricted_to("l2", ["d2"]),
                Label::new("l3"),
            ],
            devices(3),
        );

        assert_eq!(alloc.reimage_bound(), Some(1));
        assert_eq!(name(&alloc, alloc.allocate(id(&alloc, "d1"))), Some("l1"));
        assert_eq!(name(&alloc, alloc.allocate(id(&alloc, "d2"))), Some("l2"));
        assert_eq!(name(&alloc, alloc.allocate(id(&alloc, "d3"))), Some("l3"));
    }

    #[test]
    fn device_outside_every_restriction_gets_nothing() {
        let alloc = ready(
            vec![
                Label::restricted_to("l1", ["d1"]),
                Label::restricted_to("l2", ["d2"]),
            ],
            devices(3),
        );
        let l1 = alloc.label_id("l1").unwrap();
        let l2 = alloc.label_id("l2").unwrap();

        assert_eq!(alloc.cell(l1, id(&alloc, "d1")), CellState::Planned);
        assert_eq!(alloc.cell(l2, id(&alloc, "d2")), CellState::Planned);
        assert_eq!(alloc.allocate(id(&alloc, "d3")), None);

        assert_eq!(alloc.allocate(id(&alloc, "d1")), Some(l1));
        assert_eq!(alloc.allocate(id(&alloc, "d1")), None);
    }

    #[test]
    fn unknown_remote_fails_initial_allocation() {
        let mut alloc = ImageAllocator::new(
            vec![Label::new("l1"), Label::restricted_to("l2", ["ghost"])],
            devices(2),
        );

        assert!(!alloc.compute_initial_allocation());
        assert_eq!(alloc.reimage_bound(), None);
        assert_eq!(alloc.unreachable_labels(), vec!["l2".to_string()]);
    }

    #[test]
    fn initialize_names_unreachable_labels() {
        let mut alloc = ImageAllocator::new(
            vec![
                Label::restricted_to("a", ["ghost"]),
                Label::new("b"),
                Label::restricted_to("c", ["phantom"]),
            ],
            devices(2),
        );

        let err = alloc.initialize().unwrap_err();
        assert!(matches!(&err, CoreError::Unsatisfiable { labels } if labels == &["a", "c"]));
        assert_eq!(
            err.to_string(),
            "labels not compatible with any device: a, c"
        );
    }

    #[test]
    fn initialize_returns_bound() {
        let mut alloc = ImageAllocator::new(
            (0..4).map(|i| Label::new(format!("l{i}"))).collect(),
            devices(2),
        );
        assert_eq!(alloc.initialize().unwrap(), 3);
    }

    #[test]
    fn from_pool_rejects_invalid_pool() {
        let pool = PoolSpec::new(vec![Label::new("a")], vec![Device::new("x"), Device::new("x")]);
        assert!(matches!(
            ImageAllocator::from_pool(&pool),
            Err(CoreError::Pool(_))
        ));
    }

    #[test]
    fn greedy_prefers_fewest_reimages() {
        let alloc = ready(vec![Label::new("a"), Label::new("b")], devices(3));
        let (d1, d2, d3) = (id(&alloc, "d1"), id(&alloc, "d2"), id(&alloc, "d3"));

        // Plan is a -> d1, b -> d2; d3 has nothing planned.
        assert_eq!(name(&alloc, alloc.allocate(d1)), Some("a"));
        assert_eq!(name(&alloc, alloc.allocate(d3)), Some("b"));
        assert_eq!(name(&alloc, alloc.allocate(d2)), Some("b"));

        // a: 1 reimage, b: 2 reimages.
        assert_eq!(name(&alloc, alloc.allocate(d2)), Some("a"));
        assert_eq!(alloc.reimage_count(alloc.label_id("a").unwrap()), 2);
        assert_eq!(name(&alloc, alloc.allocate(d3)), Some("a"));
        assert_eq!(alloc.allocate(d3), None);

        let sources: Vec<_> = alloc.ledger().events().iter().map(|e| e.source).collect();
        assert_eq!(
            sources,
            vec![
                AllocationSource::Planned,
                AllocationSource::Greedy,
                AllocationSource::Planned,
                AllocationSource::Greedy,
                AllocationSource::Greedy,
            ]
        );
    }

    #[test]
    fn greedy_tie_breaks_on_pending_then_ordinal() {
        let alloc = ready(
            vec![Label::new("a"), Label::new("b"), Label::new("c")],
            devices(4),
        );
        for d in ["d1", "d2", "d3"] {
            alloc.allocate(id(&alloc, d)).unwrap();
        }
        let d4 = id(&alloc, "d4");
        let (a, b, c) = (LabelId::new(0), LabelId::new(1), LabelId::new(2));

        // Every label has one reimage: more pending work wins, empty labels are skipped.
        let pending = BTreeMap::from([(a, 1), (b, 5), (c, 0)]);
        assert_eq!(alloc.allocate_with(d4, &pending), Some(b));

        // a and c tie on reimages and pending work: lowest ordinal wins.
        let pending = |_: LabelId| 2;
        assert_eq!(alloc.allocate_with(d4, &pending), Some(a));
        assert_eq!(alloc.allocate_with(d4, &pending), Some(c));
        assert_eq!(alloc.allocate_with(d4, &pending), None);
    }

    #[test]
    fn labels_without_pending_work_do_not_trigger_reimage() {
        let alloc = ready(vec![Label::new("a"), Label::new("b")], devices(3));
        let d3 = id(&alloc, "d3");

        let nothing_left = |_: LabelId| 0;
        assert_eq!(alloc.allocate_with(d3, &nothing_left), None);

        // The cells were not consumed: without the signal the device still gets work.
        assert_eq!(alloc.allocate(d3), Some(LabelId::new(0)));
    }

    #[test]
    fn planned_cells_are_consumed_regardless_of_pending() {
        let alloc = ready(vec![Label::new("a"), Label::new("b")], devices(1));
        let d1 = id(&alloc, "d1");

        let nothing_left = |_: LabelId| 0;
        assert_eq!(alloc.allocate_with(d1, &nothing_left), Some(LabelId::new(0)));
    }

    #[test]
    fn render_matrix_tracks_transitions() {
        let alloc = ready(
            vec![Label::restricted_to("a", ["d1"]), Label::new("b")],
            devices(2),
        );
        assert_eq!(alloc.render_matrix(), "OX\n.O");

        alloc.allocate(id(&alloc, "d1"));
        alloc.allocate(id(&alloc, "d1"));
        assert_eq!(alloc.render_matrix(), "*X\n*O");
    }

    #[test]
    fn empty_label_set_has_no_work() {
        let alloc = ready(vec![], devices(2));
        assert_eq!(alloc.reimage_bound(), Some(0));
        assert_eq!(alloc.allocate(id(&alloc, "d1")), None);
    }

    #[test]
    #[should_panic(expected = "before compute_initial_allocation")]
    fn allocate_before_initial_allocation_panics() {
        let alloc = ImageAllocator::new(vec![Label::new("a")], devices(1));
        alloc.allocate(DeviceId::new(0));
    }

    #[test]
    #[should_panic(expected = "unsatisfiable")]
    fn allocate_after_unsatisfiable_panics() {
        let mut alloc = ImageAllocator::new(vec![Label::restricted_to("a", ["x"])], devices(1));
        assert!(!alloc.compute_initial_allocation());
        alloc.allocate(DeviceId::new(0));
    }

    #[test]
    #[should_panic(expected = "exactly once")]
    fn initial_allocation_runs_once() {
        let mut alloc = ready(vec![Label::new("a")], devices(1));
        alloc.compute_initial_allocation();
    }

    #[test]
    #[should_panic(expected = "unknown device#5")]
    fn unknown_device_panics() {
        let alloc = ready(vec![Label::new("a")], devices(1));
        alloc.allocate(DeviceId::new(5));
    }

    #[derive(Default)]
    struct Recording {
        events: StdMutex<Vec<String>>,
    }

    impl MetricsBackend for Recording {
        fn record_initial_allocation(&self, outcome: SolveOutcome, bound: usize, _: u64) {
            self.events
                .lock()
                .unwrap()
                .push(format!("solve:{}:{bound}", outcome.as_label()));
        }

        fn record_allocation(&self, label: &str, source: AllocationSource) {
            self.events
                .lock()
                .unwrap()
                .push(format!("alloc:{label}:{}", source.as_label()));
        }

        fn record_exhausted(&self, device: &str) {
            self.events.lock().unwrap().push(format!("exhausted:{device}"));
        }
    }

    #[test]
    fn reports_to_metrics_backend() {
        let metrics = Arc::new(Recording::default());
        let mut alloc =
            ImageAllocator::new(vec![Label::new("a")], devices(1)).with_metrics(metrics.clone());

        assert!(alloc.compute_initial_allocation());
        alloc.allocate(DeviceId::new(0));
        alloc.allocate(DeviceId::new(0));

        assert_eq!(
            *metrics.events.lock().unwrap(),
            vec!["solve:solved:1", "alloc:a:planned", "exhausted:d1"]
        );
    }

    #[test]
    fn allocator_is_shareable_between_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ImageAllocator>();
    }

    #[test]
    fn concurrent_workers_never_share_a_cell() {
        let labels: Vec<_> = (0..6)
            .map(|i| match i % 3 {
                0 => Label::new(format!("l{i}")),
                1 => Label::restricted_to(format!("l{i}"), ["d1", "d2"]),
                _ => Label::restricted_to(format!("l{i}"), ["d3"]),
            })
            .collect();
        let alloc = ready(labels, devices(4));
        let compatible: usize = (0..alloc.labels().len())
            .map(|l| {
                (0..alloc.devices().len())
                    .filter(|&d| {
                        alloc
                            .cell(LabelId::new(l), DeviceId::new(d))
                            .is_compatible()
                    })
                    .count()
            })
            .sum();

        let alloc = Arc::new(alloc);
        let handed_out: Vec<(LabelId, DeviceId)> = thread::scope(|s| {
            let workers: Vec<_> = (0..alloc.devices().len())
                .map(|d| {
                    let alloc = Arc::clone(&alloc);
                    s.spawn(move || {
                        let device = DeviceId::new(d);
                        let mut got = Vec::new();
                        while let Some(label) = alloc.allocate(device) {
                            got.push((label, device));
                        }
                        got
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|w| w.join().unwrap())
                .collect()
        });

        let unique: HashSet<_> = handed_out.iter().copied().collect();
        assert_eq!(unique.len(), handed_out.len());
        assert_eq!(handed_out.len(), compatible);
        assert_eq!(alloc.ledger().len(), compatible);
        for (label, device) in handed_out {
            assert!(alloc.label(label).accepts(alloc.device(device)));
        }
    }

    /// Pool of up to 5 devices and 6 labels; restriction indices past the
    /// device count name devices that do not exist.
    fn arb_pool() -> impl Strategy<Value = (Vec<Label>, Vec<Device>)> {
        (1usize..=5, 0usize..=6).prop_flat_map(|(n_devices, n_labels)| {
            prop::collection::vec(
                prop::option::of(prop::collection::btree_set(1usize..=6, 1..3)),
                n_labels,
            )
            .prop_map(move |restrictions| {
                let labels = restrictions
                    .into_iter()
                    .enumerate()
                    .map(|(i, r)| match r {
                        None => Label::new(format!("l{i}")),
                        Some(set) => Label::restricted_to(
                            format!("l{i}"),
                            set.into_iter().map(|d| format!("d{d}")),
                        ),
                    })
                    .collect();
                (labels, devices(n_devices))
            })
        })
    }

    /// Allocate round-robin until every device reports exhaustion.
    fn drain(alloc: &ImageAllocator) -> Vec<(LabelId, DeviceId)> {
        let pending = |l: LabelId| (l.ordinal() * 7) % 4;
        let mut out = Vec::new();
        let mut done = vec![false; alloc.devices().len()];
        while done.iter().any(|d| !d) {
            for (d, finished) in done.iter_mut().enumerate() {
                if *finished {
                    continue;
                }
                match alloc.allocate_with(DeviceId::new(d), &pending) {
                    Some(label) => out.push((label, DeviceId::new(d))),
                    None => *finished = true,
                }
            }
        }
        out
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn solve_plans_every_label_within_bound((labels, devices) in arb_pool()) {
            let satisfiable = labels.iter().all(|l| devices.iter().any(|d| l.accepts(d)));
            let mut alloc = ImageAllocator::new(labels, devices);

            prop_assert_eq!(alloc.compute_initial_allocation(), satisfiable);
            if !satisfiable {
                return Ok(());
            }

            let bound = alloc.reimage_bound().unwrap();
            let state = alloc.lock();
            for l in 0..state.matrix.num_labels() {
                prop_assert!(state.matrix.row_contains(LabelId::new(l), CellState::Planned));
            }
            for d in 0..state.matrix.num_devices() {
                prop_assert!(state.matrix.count_in_column(DeviceId::new(d), CellState::Planned) <= bound);
            }
        }

        #[test]
        fn allocations_are_compatible_and_terminate((labels, devices) in arb_pool()) {
            let mut alloc = ImageAllocator::new(labels, devices);
            if !alloc.compute_initial_allocation() {
                return Ok(());
            }

            for d in 0..alloc.devices().len() {
                let device = DeviceId::new(d);
                let mut handed = 0;
                while let Some(label) = alloc.allocate(device) {
                    prop_assert!(alloc.label(label).accepts(alloc.device(device)));
                    prop_assert_eq!(alloc.cell(label, device), CellState::Taken);
                    handed += 1;
                    prop_assert!(handed <= alloc.labels().len());
                }
            }

            for l in 0..alloc.labels().len() {
                prop_assert!(alloc.reimage_count(LabelId::new(l)) >= 1);
            }
        }

        #[test]
        fn identical_runs_produce_identical_ledgers((labels, devices) in arb_pool()) {
            let mut first = ImageAllocator::new(labels.clone(), devices.clone());
            let mut second = ImageAllocator::new(labels, devices);
            if !first.compute_initial_allocation() {
                prop_assert!(!second.compute_initial_allocation());
                return Ok(());
            }
            prop_assert!(second.compute_initial_allocation());

            prop_assert_eq!(drain(&first), drain(&second));
            prop_assert_eq!(first.ledger(), second.ledger());
        }
    }
}
