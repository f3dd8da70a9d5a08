use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct BuildEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> BuildEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    /// Runs extract, transform and load in order. Any failure stops the run
    /// before the artifact is written.
    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting build");
        self.monitor.log_phase("Start");

        tracing::info!("📥 Loading study setup...");
        let setup = self.pipeline.extract().await?;
        tracing::info!("📥 {} studied substances", setup.studied.len());
        self.monitor.log_phase("Extract");

        tracing::info!("🔧 Aggregating dispensations...");
        let artifact = self.pipeline.transform(setup).await?;
        tracing::info!(
            "🔧 Aggregated {} substances over {} years",
            artifact.boxes_by_substance.0.len(),
            artifact.boxes_by_sex.len()
        );
        self.monitor.log_phase("Transform");

        tracing::info!("💾 Writing artifact...");
        let output_path = self.pipeline.load(artifact).await?;
        self.monitor.log_phase("Load");
        self.monitor.log_summary();

        Ok(output_path)
    }
}
