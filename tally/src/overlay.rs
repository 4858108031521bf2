use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tiny_skia::Pixmap;
use tracing::{debug, info};

use crate::config::{Config, OutputMode};
use crate::geometry::{dimensions_equal, margin_equal, Dimensions, SCALE_BASE};
use crate::input::{self, LineReader};
use crate::outputs::{match_output, placement_for, OutputIdentity, Placement};
use crate::render;
use crate::style::{self, Resolved};

/// The windowing system as seen by the overlay.
pub trait Display {
    type Output: Clone + PartialEq;
    type Surface;
    type SurfaceId: PartialEq;
    type Buffer: Canvas;

    fn surface_id(&self, surface: &Self::Surface) -> Self::SurfaceId;
    /// Creates an overlay surface on `output`, or wherever the display likes
    /// without one. It may only be drawn to once configured.
    fn create_surface(&mut self, output: Option<&Self::Output>, placement: &Placement) -> Result<Self::Surface>;
    /// Applies new size, margin and anchor; takes effect with the next presentation.
    fn configure_surface(&mut self, surface: &Self::Surface, placement: &Placement);
    fn allocate(&mut self, dims: &Dimensions) -> Result<Self::Buffer>;
    /// Attaches `buffer`, requests a frame acknowledgement and commits.
    fn present(&mut self, surface: &Self::Surface, buffer: &mut Self::Buffer, placement: &Placement, scale: u32) -> Result<()>;
    fn destroy_surface(&mut self, surface: Self::Surface);
}

/// Shared pixel memory in ARGB8888 sized for the buffer's dimensions.
pub trait Canvas {
    fn pixels(&mut self) -> Result<&mut [u8]>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
}

struct Frame<B> {
    dims: Dimensions,
    pixmap: Pixmap,
    buffer: B,
}

struct Surface<D: Display> {
    handle: D::Surface,
    placement: Placement,
    configured: bool,
    frame_pending: bool,
    dirty: bool,
    frame: Option<Frame<D::Buffer>>,
}

/// A known output. The focused-output slot has no handle.
struct Output<D: Display> {
    handle: Option<D::Output>,
    identity: OutputIdentity,
    scale: u32,
    surface: Option<Surface<D>>,
}

pub struct Overlay<D: Display> {
    config: Config,
    visibility: Visibility,
    desired: Option<Resolved>,
    deadline: Option<Instant>,
    outputs: Vec<Output<D>>,
}

impl<D: Display> Overlay<D> {
    pub fn new(config: Config) -> Self {
        let mut outputs = Vec::new();
        if config.output_mode == OutputMode::Focused {
            let identity = OutputIdentity { name: Some("focused".into()), description: None };
            outputs.push(Output { handle: None, identity, scale: SCALE_BASE, surface: None });
        }
        Self { config, visibility: Visibility::Hidden, desired: None, deadline: None, outputs }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// How long the event loop may sleep before the overlay has to hide.
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn handle_line(&mut self, display: &mut D, line: &str, now: Instant) -> Result<()> {
        let command = input::parse(line)
            .with_context(|| format!("invalid input {:?}", line.trim_end_matches('\n')))?;
        info!("Received input {{ value = {}, style = {} }}", command.value, command.style.as_deref().unwrap_or("<empty>"));
        let resolved = style::resolve(&self.config, command.value, command.style.as_deref());
        self.show(display, resolved, now)
    }

    pub fn show(&mut self, display: &mut D, resolved: Resolved, now: Instant) -> Result<()> {
        let c = &resolved.colors;
        info!(
            "Rendering {{ value = {}, overflow = {}, bg = {}, border = {}, bar = {} }}",
            resolved.value, resolved.overflow, c.background, c.border, c.bar
        );
        self.desired = Some(resolved);
        self.visibility = Visibility::Visible;
        self.deadline = Some(now + self.config.timeout);

        if !self.outputs.iter().any(|o| renders_on(&self.config, o)) {
            info!("No output found to render on");
        }
        for output in &mut self.outputs {
            if !renders_on(&self.config, output) {
                continue;
            }
            match output.surface.as_mut() {
                Some(surface) => surface.dirty = true,
                None => output.surface = Some(open_surface(display, &self.config, output)?),
            }
            redraw(display, &self.config, self.desired.as_ref(), output)?;
        }
        Ok(())
    }

    /// Hides once the deadline set by the last input has passed.
    pub fn tick(&mut self, display: &mut D, now: Instant) {
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            self.hide(display);
        }
    }

    pub fn hide(&mut self, display: &mut D) {
        for output in &mut self.outputs {
            if let Some(surface) = output.surface.take() {
                info!("Hiding bar on output {}", output.identity.label());
                close_surface(display, surface);
            }
        }
        self.visibility = Visibility::Hidden;
        self.deadline = None;
    }

    pub fn output_added(&mut self, display: &mut D, handle: D::Output, identity: OutputIdentity) -> Result<()> {
        if self.outputs.iter().any(|o| o.handle.as_ref() == Some(&handle)) {
            return self.output_updated(display, &handle, identity);
        }
        info!("Output {} connected", identity.label());
        self.outputs.push(Output { handle: Some(handle), identity, scale: SCALE_BASE, surface: None });

        if self.visibility == Visibility::Visible {
            if let Some(output) = self.outputs.last_mut().filter(|o| renders_on(&self.config, o)) {
                output.surface = Some(open_surface(display, &self.config, output)?);
                redraw(display, &self.config, self.desired.as_ref(), output)?;
            }
        }
        Ok(())
    }

    pub fn output_updated(&mut self, display: &mut D, handle: &D::Output, identity: OutputIdentity) -> Result<()> {
        let Some(i) = self.outputs.iter().position(|o| o.handle.as_ref() == Some(handle)) else {
            return self.output_added(display, handle.clone(), identity);
        };
        let output = &mut self.outputs[i];
        output.identity = identity;

        if !renders_on(&self.config, output) {
            if let Some(surface) = output.surface.take() {
                info!("Output {} no longer selected, hiding bar", output.identity.label());
                close_surface(display, surface);
            }
            return Ok(());
        }
        if output.surface.is_none() {
            if self.visibility == Visibility::Visible {
                output.surface = Some(open_surface(display, &self.config, output)?);
            }
        } else if let Some(surface) = output.surface.as_mut() {
            let placement = placement_for(&self.config, &output.identity);
            let resized = !dimensions_equal(&placement.dimensions, &surface.placement.dimensions);
            let moved = !margin_equal(&placement.margin, &surface.placement.margin) || placement.anchor != surface.placement.anchor;
            if resized || moved {
                debug!("Output {} now uses {placement:?}", output.identity.label());
                display.configure_surface(&surface.handle, &placement);
                surface.placement = placement;
                surface.dirty = true;
            }
        }
        redraw(display, &self.config, self.desired.as_ref(), output)
    }

    pub fn output_removed(&mut self, display: &mut D, handle: &D::Output) {
        let Some(i) = self.outputs.iter().position(|o| o.handle.as_ref() == Some(handle)) else {
            return;
        };
        let output = self.outputs.remove(i);
        info!("Output {} disconnected", output.identity.label());
        if let Some(surface) = output.surface {
            close_surface(display, surface);
        }
    }

    pub fn surface_configured(&mut self, display: &mut D, id: &D::SurfaceId) -> Result<()> {
        let Some(output) = output_for(&mut self.outputs, display, id) else { return Ok(()) };
        if let Some(surface) = output.surface.as_mut() {
            surface.configured = true;
        }
        redraw(display, &self.config, self.desired.as_ref(), output)
    }

    pub fn frame_done(&mut self, display: &mut D, id: &D::SurfaceId) -> Result<()> {
        let Some(output) = output_for(&mut self.outputs, display, id) else { return Ok(()) };
        if let Some(surface) = output.surface.as_mut() {
            surface.frame_pending = false;
        }
        redraw(display, &self.config, self.desired.as_ref(), output)
    }

    pub fn scale_changed(&mut self, display: &mut D, id: &D::SurfaceId, scale: u32) -> Result<()> {
        let Some(output) = output_for(&mut self.outputs, display, id) else { return Ok(()) };
        if output.scale == scale {
            return Ok(());
        }
        debug!("Output {} scale is now {scale}/{SCALE_BASE}", output.identity.label());
        output.scale = scale;
        if let Some(surface) = output.surface.as_mut() {
            surface.dirty = true;
        }
        redraw(display, &self.config, self.desired.as_ref(), output)
    }

    /// The display tore the surface down on its own.
    pub fn surface_closed(&mut self, display: &mut D, id: &D::SurfaceId) {
        let Some(output) = output_for(&mut self.outputs, display, id) else { return };
        if let Some(surface) = output.surface.take() {
            info!("Surface on output {} was closed", output.identity.label());
            close_surface(display, surface);
        }
    }

    /// Feeds every complete line in `reader` to the overlay. Once input is over,
    /// or a line is rejected, the bar is hidden and the final outcome returned.
    pub fn drain_input(&mut self, display: &mut D, reader: &mut LineReader, open: bool, now: Instant) -> Option<Result<()>> {
        let result = self.drain_lines(display, reader, open, now)?;
        self.hide(display);
        Some(result)
    }

    fn drain_lines(&mut self, display: &mut D, reader: &mut LineReader, open: bool, now: Instant) -> Option<Result<()>> {
        loop {
            let line = match reader.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("invalid input"))),
            };
            if let Err(e) = self.handle_line(display, &line, now) {
                return Some(Err(e));
            }
        }
        if open {
            return None;
        }

        info!("Reached end of input");
        Some(match reader.take_remainder() {
            Some(rest) => self.handle_line(display, &rest, now),
            None => Ok(()),
        })
    }
}

fn renders_on<D: Display>(config: &Config, output: &Output<D>) -> bool {
    match config.output_mode {
        OutputMode::Focused => output.handle.is_none(),
        OutputMode::All => true,
        OutputMode::Whitelist => match_output(config, &output.identity).is_some(),
    }
}

fn output_for<'a, D: Display>(outputs: &'a mut [Output<D>], display: &D, id: &D::SurfaceId) -> Option<&'a mut Output<D>> {
    outputs.iter_mut().find(|o| {
        o.surface.as_ref().is_some_and(|s| display.surface_id(&s.handle) == *id)
    })
}

fn open_surface<D: Display>(display: &mut D, config: &Config, output: &Output<D>) -> Result<Surface<D>> {
    let placement = placement_for(config, &output.identity);
    let handle = display.create_surface(output.handle.as_ref(), &placement)
        .with_context(|| format!("failed to create surface on output {}", output.identity.label()))?;
    info!("Showing bar on output {}", output.identity.label());
    Ok(Surface { handle, placement, configured: false, frame_pending: false, dirty: true, frame: None })
}

fn close_surface<D: Display>(display: &mut D, surface: Surface<D>) {
    let Surface { handle, frame, .. } = surface;
    display.destroy_surface(handle);
    drop(frame);
}

fn allocate_frame<D: Display>(display: &mut D, dims: Dimensions) -> Result<Frame<D::Buffer>> {
    let pixmap = Pixmap::new(dims.width, dims.height)
        .with_context(|| format!("cannot draw a {}x{} bar", dims.width, dims.height))?;
    let buffer = display.allocate(&dims)
        .with_context(|| format!("failed to allocate a {}x{} buffer", dims.width, dims.height))?;
    Ok(Frame { dims, pixmap, buffer })
}

/// Draws and presents the desired state if the surface can take a frame now.
/// A frame still in flight defers the draw to its acknowledgement.
fn redraw<D: Display>(display: &mut D, config: &Config, desired: Option<&Resolved>, output: &mut Output<D>) -> Result<()> {
    let Some(desired) = desired else { return Ok(()) };
    let scale = output.scale;
    let Some(surface) = output.surface.as_mut() else { return Ok(()) };
    if !surface.configured || surface.frame_pending || !surface.dirty {
        return Ok(());
    }

    let dims = surface.placement.dimensions.scale(scale);
    let stale = surface.frame.as_ref().is_none_or(|f| !dimensions_equal(&f.dims, &dims));
    if stale {
        debug!("Allocating {}x{} buffer for output {}", dims.width, dims.height, output.identity.label());
        surface.frame = None;
        surface.frame = Some(allocate_frame(display, dims)?);
    }
    let Some(frame) = surface.frame.as_mut() else { return Ok(()) };

    render::draw(&mut frame.pixmap, &dims, &desired.colors, desired.value, config.max);
    render::blit_argb8888(&frame.pixmap, frame.buffer.pixels()?);
    display.present(&surface.handle, &mut frame.buffer, &surface.placement, scale)?;
    surface.frame_pending = true;
    surface.dirty = false;
    Ok(())
}
