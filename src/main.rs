use std::{collections::BTreeSet, env, io, num::NonZeroUsize, sync::Arc, thread};

use dense_table::{DenseTable, Place, Scope, TableConfig, TableWorker, Tensor, VarStore};
use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};

const DEFAULT_DEVICES: usize = 4;
const DEFAULT_STEPS: usize = 200;
const PARAM_LEN: usize = 16;

const PARAMS: [&str; 2] = ["fc_0.w_0_param", "fc_0.b_0_param"];
const STAT: &str = "data_norm.summary.batch_sum";
const LR: &str = "learning_rate_0";

fn env_or(key: &str, default: usize) -> io::Result<usize> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(io::Error::other),
        Err(_) => Ok(default),
    }
}

/// Builds a store with random parameters and zeroed optimizer state.
fn build_scope(rng: &mut StdRng) -> Scope {
    let mut scope = Scope::new();

    for name in PARAMS {
        let values = (0..PARAM_LEN).map(|_| rng.random_range(-1.0..1.0)).collect();
        scope.insert(name, Tensor::new(vec![PARAM_LEN], values));
        scope.insert(format!("{name}_moment1_0"), Tensor::filled(vec![PARAM_LEN], 0.));
        scope.insert(format!("{name}_moment2_0"), Tensor::filled(vec![PARAM_LEN], 0.));
    }

    scope.insert(STAT, Tensor::filled(vec![1], 0.));
    scope.insert(LR, Tensor::scalar(0.05));
    scope
}

fn main() -> io::Result<()> {
    env_logger::init();

    let devices = NonZeroUsize::new(env_or("DEVICES", DEFAULT_DEVICES)?)
        .ok_or_else(|| io::Error::other("DEVICES must be positive"))?;
    let steps = env_or("STEPS", DEFAULT_STEPS)?;

    let mut rng = StdRng::seed_from_u64(7);
    let mut scope = build_scope(&mut rng);
    let target: Arc<[f32]> = (0..PARAM_LEN).map(|_| rng.random_range(-1.0..1.0)).collect();

    let params: Vec<String> = PARAMS.iter().chain(&[STAT]).map(|s| s.to_string()).collect();
    let grads: BTreeSet<String> = params.iter().map(|name| format!("{name}@GRAD")).collect();
    let persistables = vec![LR.to_string()];

    let table = Arc::new(DenseTable::new(TableConfig::new(devices)));
    let synced = table.initialize(&scope, &params, &persistables, &grads)?;
    info!("synchronizing {} variables across {devices} devices", synced.len());

    thread::scope(|s| {
        let handles: Vec<_> = (0..devices.get())
            .map(|id| {
                let table = Arc::clone(&table);
                let target = Arc::clone(&target);

                s.spawn(move || -> dense_table::Result<()> {
                    let mut worker = TableWorker::bind(table, Place::Device(id))?;

                    for _ in 0..steps {
                        worker.step(|params, grads| {
                            for name in PARAMS {
                                let (Some(p), Some(g)) =
                                    (params.get(name), grads.get_mut(&format!("{name}@GRAD")))
                                else {
                                    continue;
                                };

                                for ((g, p), t) in g.iter_mut().zip(p).zip(target.iter()) {
                                    *g = p - t;
                                }
                            }

                            if let Some(stat) = grads.get_mut(&format!("{STAT}@GRAD")) {
                                stat.fill(1.);
                            }
                        })?;
                    }

                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle
                .join()
                .map_err(|_| io::Error::other("worker panicked"))??;
        }

        Ok::<_, io::Error>(())
    })?;

    table.finalize(&mut scope)?;

    let stats = table.stats();
    info!(cycles = stats.cycles, merged = stats.merged; "training finished");

    for name in PARAMS {
        let values = scope.find(name).map(Tensor::data).unwrap_or_default();
        let dist: f32 = values
            .iter()
            .zip(target.iter())
            .map(|(v, t)| (v - t).powi(2))
            .sum::<f32>()
            .sqrt();
        info!("{name}: distance to target {dist:.4}");
    }

    Ok(())
}
