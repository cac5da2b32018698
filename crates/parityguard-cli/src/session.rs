use std::path::{Path, PathBuf};
use std::sync::Arc;

use parityguard_dashboard::{DashboardParser, Widget};
use parityguard_mapping::MappingRegistry;
use parityguard_monitor::{Alerter, ContinuousValidator, FileHistoryStore, MonitorConfig};
use parityguard_validate::{DataSource, ParityValidator, ReplaySource};

use crate::{CliError, SourceArgs};

/// Everything a validation command needs, loaded from the command line.
pub struct Session {
    pub config: MonitorConfig,
    pub registry: Arc<MappingRegistry>,
    pub validator: Arc<ParityValidator>,
    pub widgets: Vec<Widget>,
    pub history: Arc<FileHistoryStore>,
}

impl Session {
    pub fn open(args: &SourceArgs) -> Result<Self, CliError> {
        let config = load_config(args.config.as_deref())?;
        let registry = Arc::new(MappingRegistry::load(&args.mappings)?);

        let mut parser = DashboardParser::new();
        let widgets = parser.parse_file(&args.dashboard)?;
        tracing::info!(
            event = "dashboard_loaded",
            path = %args.dashboard.display(),
            widgets = widgets.len()
        );

        let legacy: Arc<dyn DataSource> = Arc::new(ReplaySource::from_path("legacy", &args.legacy_fixture)?);
        let new: Arc<dyn DataSource> = Arc::new(ReplaySource::from_path("new", &args.new_fixture)?);
        let validator = Arc::new(ParityValidator::new(
            legacy,
            new,
            Arc::clone(&registry),
            config.parity.clone(),
        )?);

        let history = Arc::new(open_history(&config, args.history_dir.as_deref())?);

        Ok(Self {
            config,
            registry,
            validator,
            widgets,
            history,
        })
    }

    pub fn continuous(&self) -> ContinuousValidator {
        let alerter = Arc::new(Alerter::new(self.config.alerting.clone()));
        ContinuousValidator::new(
            Arc::clone(&self.validator),
            self.widgets.clone(),
            self.history.clone(),
            alerter,
            self.config.clone(),
        )
    }
}

/// Load the monitor configuration, or the defaults without a file.
pub fn load_config(path: Option<&Path>) -> Result<MonitorConfig, CliError> {
    match path {
        Some(path) => {
            let config = MonitorConfig::load(path)?;
            tracing::info!(event = "config_loaded", path = %path.display());
            Ok(config)
        }
        None => Ok(MonitorConfig::default()),
    }
}

pub fn open_history(config: &MonitorConfig, override_dir: Option<&Path>) -> Result<FileHistoryStore, CliError> {
    let root: PathBuf = override_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.validation.history_dir.clone());
    Ok(FileHistoryStore::open(root)?)
}
