use chrono::{DateTime, Duration, Local};
use rand::distr::{Distribution, Uniform};
use rand::Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use repkv_parser::Command;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// How many sites and variables the generated workloads address. These
/// match the fixed cluster the engine builds.
const SITES: u8 = 10;
const VARIABLES: u8 = 20;

#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
pub struct WorkloadParams {
    pub id: u64,
    /// Total transactions begun over the workload.
    pub n_transaction: u64,
    /// Read/write operations per transaction.
    pub n_op: u64,
    /// How many transactions may be live at once.
    pub n_concurrent: u64,
    /// Fail/recover pairs sprinkled through the workload.
    pub n_fault: u64,
}

/// A generated command script plus its generation metadata.
#[derive(Debug, Serialize)]
pub struct Workload {
    params: WorkloadParams,
    info: String,
    start: DateTime<Local>,
    end: DateTime<Local>,
    #[serde(skip)]
    data: Vec<Command>,
}

impl Workload {
    #[must_use]
    pub const fn get_id(&self) -> u64 {
        self.params.id
    }

    #[must_use]
    pub const fn get_data(&self) -> &Vec<Command> {
        &self.data
    }

    #[must_use]
    pub const fn get_params(&self) -> &WorkloadParams {
        &self.params
    }

    #[must_use]
    pub fn get_duration(&self) -> Duration {
        self.end - self.start
    }

    /// Renders the script, one command per line, with a header comment.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "// generated workload {} ({} txns, {} ops each, {} faults)\n",
            self.params.id, self.params.n_transaction, self.params.n_op, self.params.n_fault
        );
        for command in &self.data {
            out.push_str(&command.to_string());
            out.push('\n');
        }
        out
    }
}

/// Generate a single workload script.
///
/// Transactions `T1..Tn` are begun in a sliding window of up to
/// `n_concurrent` live transactions; each issues `n_op` random reads and
/// writes over `x1..x20` before it ends. `n_fault` fail/recover pairs hit
/// random UP sites between operations, recovering before the next fault,
/// so the site histories keep alternating. Every begun transaction is
/// ended, and a `dump()` closes the script.
///
/// Written values are unique across the workload, so first-committer
/// conflicts are observable in the output but never ambiguous.
///
/// # Panics
///
/// Panics if `n_transaction`, `n_op`, or `n_concurrent` is zero.
#[must_use]
pub fn generate_single_workload(
    n_transaction: u64,
    n_op: u64,
    n_concurrent: u64,
    n_fault: u64,
) -> Vec<Command> {
    assert!(n_transaction > 0 && n_op > 0 && n_concurrent > 0);

    let mut rng = rand::rng();
    let variable_range = Uniform::new_inclusive(1, VARIABLES).expect("non-empty range");
    let site_range = Uniform::new_inclusive(1, SITES).expect("non-empty range");

    let mut commands = Vec::new();
    let mut live: Vec<(String, u64)> = Vec::new();
    let mut next_txn: u64 = 1;
    let mut next_value: u64 = 1;
    let mut faults_left = n_fault;
    let mut downed: Option<String> = None;

    // Operations remaining across all transactions, used to spread the
    // faults roughly evenly.
    let total_ops = n_transaction * n_op;
    let fault_every = if n_fault > 0 {
        (total_ops / (n_fault + 1)).max(1)
    } else {
        u64::MAX
    };
    let mut ops_issued: u64 = 0;

    while next_txn <= n_transaction || !live.is_empty() {
        // Keep the window full while transactions remain.
        while live.len() < n_concurrent as usize && next_txn <= n_transaction {
            let name = format!("T{next_txn}");
            commands.push(Command::Begin { txn: name.clone() });
            live.push((name, n_op));
            next_txn += 1;
        }

        let index = rng.random_range(0..live.len());
        let (name, remaining) = &mut live[index];
        let variable = format!("x{}", variable_range.sample(&mut rng));
        if rng.random::<bool>() {
            commands.push(Command::Read {
                txn: name.clone(),
                variable,
            });
        } else {
            commands.push(Command::Write {
                txn: name.clone(),
                variable,
                value: format!("v{next_value}"),
            });
            next_value += 1;
        }
        *remaining -= 1;
        ops_issued += 1;

        if *remaining == 0 {
            let (name, _) = live.swap_remove(index);
            commands.push(Command::End { txn: name });
        }

        // Recover the downed site before hitting another one, so
        // failures and recoveries alternate per site.
        if let Some(site) = downed.take() {
            commands.push(Command::Recover { site });
        } else if faults_left > 0 && ops_issued % fault_every == 0 {
            let site = site_range.sample(&mut rng).to_string();
            commands.push(Command::Fail { site: site.clone() });
            downed = Some(site);
            faults_left -= 1;
        }
    }

    if let Some(site) = downed.take() {
        commands.push(Command::Recover { site });
    }
    commands.push(Command::Dump);
    commands
}

#[must_use]
pub fn generate_mult_workloads(
    n_workload: u64,
    n_transaction: u64,
    n_op: u64,
    n_concurrent: u64,
    n_fault: u64,
) -> Vec<Workload> {
    (0..n_workload)
        .into_par_iter()
        .map(|id| {
            let start = Local::now();
            let data = generate_single_workload(n_transaction, n_op, n_concurrent, n_fault);
            let end = Local::now();
            Workload {
                params: WorkloadParams {
                    id,
                    n_transaction,
                    n_op,
                    n_concurrent,
                    n_fault,
                },
                info: "generated".to_string(),
                start,
                end,
                data,
            }
        })
        .collect()
}
