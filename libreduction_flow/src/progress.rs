/// Bar colour hint for front ends, one per workflow kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BarColor {
    #[default]
    CYAN,
    MAGENTA,
    GREEN,
    RED,
}

/// Progress message sent from a running workflow
#[derive(Debug, Clone, Default)]
pub struct StageStatus {
    pub progress: f32,
    pub output_name: String,
    pub stage: String,
    pub run_index: usize,
    pub color: BarColor,
}

impl StageStatus {
    pub fn new(
        progress: f32,
        output_name: &str,
        stage: &str,
        run_index: usize,
        color: BarColor,
    ) -> Self {
        Self {
            progress,
            output_name: output_name.to_string(),
            stage: stage.to_string(),
            run_index,
            color,
        }
    }
}
