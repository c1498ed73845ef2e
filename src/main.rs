use iced::widget::{button, checkbox, column, container, row, scrollable, text, Column};
use iced::{Alignment, Element, Length, Task, Theme};
use rfd::FileDialog;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use track_editor::gpu::{KeypointBuffers, PatchTarget, StagingMirror};
use track_editor::import::{self, ImportPayload};
use track_editor::state::data::{ImageId, TrackId};
use track_editor::state::InteractionMode;
use track_editor::{EditorConfig, Project};

/// Upper bound on buttons in the track list
const TRACK_LIST_LIMIT: usize = 500;

/// Main application state
struct TrackEditor {
    project: Project,
    /// GPU keypoint buffers, once the device is up
    gpu: Option<Arc<KeypointBuffers>>,
    /// CPU copy used until (or instead of) the GPU buffers
    mirror: StagingMirror,
    /// Image directory chosen for the reconstruction being loaded
    pending_image_dir: Option<PathBuf>,
    /// Status message to display to the user
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// User clicked "Open Reconstruction"
    OpenProject,
    /// Background COLMAP read finished
    ProjectLoaded(Result<ImportPayload, String>),
    /// User clicked "Add Images"
    AddImages,
    /// Keypoint buffers allocated (or failed)
    GpuReady(Result<Arc<KeypointBuffers>, String>),
    ToggleActive(ImageId, bool),
    /// User chose a track from the track list
    BeginTrackMode(TrackId),
    EndTrackMode,
}

impl TrackEditor {
    fn new() -> (Self, Task<Message>) {
        let config = EditorConfig::load().unwrap_or_else(|e| {
            tracing::warn!("⚠️  Could not load config, using defaults: {}", e);
            EditorConfig::default()
        });
        tracing::info!(
            "🎨 Track Editor initialized ({} active images × {} keypoints)",
            config.max_active_images,
            config.max_keypoints_per_image
        );

        (
            TrackEditor {
                project: Project::new(config),
                gpu: None,
                mirror: StagingMirror::new(),
                pending_image_dir: None,
                status: "Ready. Open a reconstruction to begin.".to_string(),
            },
            Task::perform(init_gpu(config), Message::GpuReady),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::OpenProject => {
                let Some(image_dir) = FileDialog::new().set_title("Select Image Folder").pick_folder() else {
                    return Task::none();
                };
                let Some(sparse_dir) = FileDialog::new()
                    .set_title("Select COLMAP Sparse Model Folder")
                    .set_directory(&image_dir)
                    .pick_folder()
                else {
                    return Task::none();
                };

                self.status = format!("Loading {}...", sparse_dir.display());
                self.pending_image_dir = Some(image_dir);
                return Task::perform(import::load_reconstruction(sparse_dir), Message::ProjectLoaded);
            }
            Message::ProjectLoaded(Ok(payload)) => {
                let image_dir = self.pending_image_dir.take().unwrap_or_default();
                // A reconstruction replaces the current session
                let mut project = Project::new(*self.project.config());
                match project.import(&payload, &image_dir) {
                    Ok(ids) => {
                        self.status = format!(
                            "✅ Loaded {} images and {} tracks.",
                            ids.len(),
                            project.graph().len()
                        );
                        // The render target still holds the previous session's draws
                        project.resync();
                        self.project = project;
                        self.mirror = StagingMirror::new();
                        self.sync();
                    }
                    Err(e) => self.status = format!("❌ Import failed: {}", e),
                }
            }
            Message::ProjectLoaded(Err(e)) => {
                self.pending_image_dir = None;
                self.status = format!("❌ Could not read reconstruction: {}", e);
            }
            Message::AddImages => {
                let Some(files) = FileDialog::new()
                    .set_title("Add Images")
                    .add_filter("Images", &["png", "jpg", "jpeg", "tif", "tiff", "bmp"])
                    .pick_files()
                else {
                    return Task::none();
                };
                let mut added = 0;
                for file in files {
                    match self.project.add_image(file.clone()) {
                        Ok(_) => added += 1,
                        Err(e) => tracing::warn!("⚠️  Skipping {}: {}", file.display(), e),
                    }
                }
                self.status = format!("Added {} images.", added);
            }
            Message::GpuReady(Ok(buffers)) => {
                tracing::info!("✅ GPU keypoint buffers ready: {:?}", buffers);
                self.gpu = Some(buffers);
                // Whatever the mirror has seen must reach the new buffers too
                self.project.resync();
                self.sync();
            }
            Message::GpuReady(Err(e)) => {
                tracing::warn!("⚠️  GPU unavailable, keeping a CPU copy only: {}", e);
            }
            Message::ToggleActive(image_id, active) => {
                match self.project.set_active(image_id, active) {
                    Ok(_) => self.sync(),
                    Err(e) => self.status = format!("⚠️  {}", e),
                }
            }
            Message::BeginTrackMode(track_id) => {
                if let Err(e) = self.project.begin_track_mode(track_id) {
                    self.status = format!("⚠️  {}", e);
                }
                self.sync();
            }
            Message::EndTrackMode => {
                if let Err(e) = self.project.end_track_mode() {
                    self.status = format!("⚠️  {}", e);
                }
                self.sync();
            }
        }

        Task::none()
    }

    /// Push pending keypoint changes to the render target
    fn sync(&mut self) {
        let target: &dyn PatchTarget = match &self.gpu {
            Some(buffers) => buffers.as_ref(),
            None => &self.mirror,
        };
        if let Err(e) = self.project.flush(target) {
            tracing::error!("❌ Keypoint upload failed: {}", e);
            self.status = format!("❌ Keypoint upload failed: {}", e);
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let mode = match self.project.mode() {
            InteractionMode::Browse => "Browse".to_string(),
            InteractionMode::Track(track_id) => format!("Track {}", track_id),
        };

        let images: Column<Message> = self
            .project
            .images()
            .fold(Column::new().spacing(6), |list, image| {
                let id = image.id;
                let label = format!(
                    "{}  ({}×{}, {} keypoints)",
                    image.name(),
                    image.size.0,
                    image.size.1,
                    image.keypoints.len()
                );
                list.push(checkbox(label, image.active).on_toggle(move |on| Message::ToggleActive(id, on)))
            });

        let tracks: Column<Message> = self
            .project
            .graph()
            .tracks()
            .take(TRACK_LIST_LIMIT)
            .fold(Column::new().spacing(4), |list, track| {
                let label = format!("{}  ({} observations, error {:.2})", track.id, track.len(), track.error);
                list.push(button(text(label).size(12)).on_press(Message::BeginTrackMode(track.id)))
            });

        let observations: Column<Message> = match self.project.mode() {
            InteractionMode::Track(track_id) => self
                .project
                .track_observations(track_id)
                .unwrap_or_default()
                .into_iter()
                .fold(Column::new().spacing(2), |list, (path, position)| {
                    list.push(
                        text(format!("{}  ({:.3}, {:.3})", path.display(), position.x, position.y)).size(12),
                    )
                }),
            InteractionMode::Browse => Column::new(),
        };

        let end_track = button("End Track Mode").padding(10);
        let end_track = match self.project.mode() {
            InteractionMode::Track(_) => end_track.on_press(Message::EndTrackMode),
            InteractionMode::Browse => end_track,
        };

        let content: Column<Message> = column![
            text("Track Editor").size(36),
            row![
                button("Open Reconstruction").on_press(Message::OpenProject).padding(10),
                button("Add Images").on_press(Message::AddImages).padding(10),
                end_track,
            ]
            .spacing(10),
            text(format!(
                "{} images, {} active, {} tracks. Mode: {}",
                self.project.catalog().len(),
                self.project.catalog().active_count(),
                self.project.graph().len(),
                mode
            ))
            .size(14),
            row![
                scrollable(images).width(Length::FillPortion(2)),
                scrollable(tracks).width(Length::FillPortion(1)),
            ]
            .spacing(16)
            .height(Length::Fill),
            observations,
            text(&self.status).size(16),
        ]
        .spacing(16)
        .padding(24)
        .align_x(Alignment::Start);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    iced::application("Track Editor", TrackEditor::update, TrackEditor::view)
        .theme(TrackEditor::theme)
        .centered()
        .run_with(TrackEditor::new)
}

/// Create the device and keypoint buffers off the UI thread
async fn init_gpu(config: EditorConfig) -> Result<Arc<KeypointBuffers>, String> {
    KeypointBuffers::new(&config)
        .await
        .map(Arc::new)
        .map_err(|e| e.to_string())
}
