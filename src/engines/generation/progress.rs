use super::calibration_engine::ProgressCallback;

/// Progress reporting through the `log` facade
pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        log::info!("###### Generation: {} ######", generation);
    }

    fn on_generation_complete(&mut self, generation: usize, hypervolume: f64, population_size: usize) {
        log::info!(
            "Generation {} complete. Hypervolume: {:.4}, Population size: {}",
            generation, hypervolume, population_size
        );
    }

    fn on_batch_evaluated(&mut self, generation: usize, evaluated: usize, failed: usize) {
        if failed > 0 {
            log::info!(
                "  Generation {}: {} model run(s) evaluated, {} failed",
                generation, evaluated, failed
            );
        } else {
            log::debug!("  Generation {}: {} model run(s) evaluated", generation, evaluated);
        }
    }
}

/// Forwards progress to another thread
pub struct ChannelProgressCallback {
    sender: std::sync::mpsc::Sender<ProgressMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart(usize),
    GenerationComplete { generation: usize, hypervolume: f64, population_size: usize },
    BatchEvaluated { generation: usize, evaluated: usize, failed: usize },
}

impl ChannelProgressCallback {
    pub fn new(sender: std::sync::mpsc::Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_generation_complete(&mut self, generation: usize, hypervolume: f64, population_size: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationComplete {
            generation,
            hypervolume,
            population_size,
        });
    }

    fn on_batch_evaluated(&mut self, generation: usize, evaluated: usize, failed: usize) {
        let _ = self.sender.send(ProgressMessage::BatchEvaluated {
            generation,
            evaluated,
            failed,
        });
    }
}
