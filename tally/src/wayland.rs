use std::fs::File;
use std::io;
use std::os::fd::AsFd;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use smithay_client_toolkit as sctk;
use sctk::compositor::{CompositorHandler, CompositorState};
use sctk::output::{OutputHandler, OutputState};
use sctk::reexports::calloop::generic::Generic;
use sctk::reexports::calloop::{EventLoop, Interest, Mode, PostAction};
use sctk::reexports::calloop_wayland_source::WaylandSource;
use sctk::reexports::protocols::wp::fractional_scale::v1::client::wp_fractional_scale_manager_v1::{self, WpFractionalScaleManagerV1};
use sctk::reexports::protocols::wp::fractional_scale::v1::client::wp_fractional_scale_v1::{self, WpFractionalScaleV1};
use sctk::reexports::protocols::wp::viewporter::client::wp_viewport::{self, WpViewport};
use sctk::reexports::protocols::wp::viewporter::client::wp_viewporter::{self, WpViewporter};
use sctk::registry::{ProvidesRegistryState, RegistryState};
use sctk::registry_handlers;
use sctk::shell::wlr_layer::{
    Anchor as LayerAnchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
    LayerSurfaceConfigure,
};
use sctk::shell::WaylandSurface;
use sctk::shm::slot::{Buffer, SlotPool};
use sctk::shm::{Shm, ShmHandler};
use sctk::{delegate_compositor, delegate_layer, delegate_output, delegate_registry, delegate_shm};
use tracing::{debug, info};
use wayland_client::backend::ObjectId;
use wayland_client::globals::registry_queue_init;
use wayland_client::protocol::{wl_output, wl_shm, wl_surface};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use crate::config::Config;
use crate::geometry::{Anchor, Dimensions, SCALE_BASE};
use crate::input::LineReader;
use crate::outputs::{OutputIdentity, Placement};
use crate::overlay::{Canvas, Display, Overlay, Visibility};
use crate::sandbox;

// --- Display ---

pub struct Client {
    compositor: CompositorState,
    layer_shell: LayerShell,
    shm: Shm,
    fractional: Option<(WpFractionalScaleManagerV1, WpViewporter)>,
    qh: QueueHandle<App>,
}

pub struct BarSurface {
    layer: LayerSurface,
    scaling: Option<(WpFractionalScaleV1, WpViewport)>,
}

impl Drop for BarSurface {
    fn drop(&mut self) {
        if let Some((fractional, viewport)) = self.scaling.take() {
            fractional.destroy();
            viewport.destroy();
        }
    }
}

/// One shm pool per buffer, sized for the scaled geometry.
pub struct ShmBuffer {
    pool: SlotPool,
    buffer: Buffer,
    dims: Dimensions,
}

impl Canvas for ShmBuffer {
    fn pixels(&mut self) -> Result<&mut [u8]> {
        if self.buffer.canvas(&mut self.pool).is_none() {
            // compositor still reads the old slot
            self.buffer = create_slot(&mut self.pool, &self.dims)?;
        }
        self.buffer.canvas(&mut self.pool).context("shm buffer is still in use")
    }
}

fn create_slot(pool: &mut SlotPool, dims: &Dimensions) -> Result<Buffer> {
    let (buffer, _) = pool
        .create_buffer(dims.width as i32, dims.height as i32, dims.stride() as i32, wl_shm::Format::Argb8888)
        .with_context(|| format!("failed to create a {}x{} shm buffer", dims.width, dims.height))?;
    Ok(buffer)
}

fn layer_anchor(anchor: Anchor) -> LayerAnchor {
    let mut out = LayerAnchor::empty();
    if anchor.top { out |= LayerAnchor::TOP; }
    if anchor.bottom { out |= LayerAnchor::BOTTOM; }
    if anchor.left { out |= LayerAnchor::LEFT; }
    if anchor.right { out |= LayerAnchor::RIGHT; }
    out
}

fn apply_placement(layer: &LayerSurface, placement: &Placement) {
    let d = &placement.dimensions;
    let m = &placement.margin;
    layer.set_size(d.width, d.height);
    layer.set_anchor(layer_anchor(placement.anchor));
    layer.set_margin(m.top as i32, m.right as i32, m.bottom as i32, m.left as i32);
}

impl Display for Client {
    type Output = wl_output::WlOutput;
    type Surface = BarSurface;
    type SurfaceId = ObjectId;
    type Buffer = ShmBuffer;

    fn surface_id(&self, surface: &BarSurface) -> ObjectId {
        surface.layer.wl_surface().id()
    }

    fn create_surface(&mut self, output: Option<&wl_output::WlOutput>, placement: &Placement) -> Result<BarSurface> {
        let surface = self.compositor.create_surface(&self.qh);
        let scaling = self.fractional.as_ref().map(|(manager, viewporter)| {
            let fractional = manager.get_fractional_scale(&surface, &self.qh, surface.clone());
            let viewport = viewporter.get_viewport(&surface, &self.qh, ());
            (fractional, viewport)
        });
        let layer = self.layer_shell.create_layer_surface(&self.qh, surface, Layer::Overlay, Some("tally"), output);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);
        apply_placement(&layer, placement);
        layer.wl_surface().commit();
        Ok(BarSurface { layer, scaling })
    }

    fn configure_surface(&mut self, surface: &BarSurface, placement: &Placement) {
        apply_placement(&surface.layer, placement);
    }

    fn allocate(&mut self, dims: &Dimensions) -> Result<ShmBuffer> {
        let mut pool = SlotPool::new(dims.byte_len(), &self.shm).context("failed to create shm pool")?;
        let buffer = create_slot(&mut pool, dims)?;
        Ok(ShmBuffer { pool, buffer, dims: *dims })
    }

    fn present(&mut self, surface: &BarSurface, buffer: &mut ShmBuffer, placement: &Placement, scale: u32) -> Result<()> {
        let wl = surface.layer.wl_surface();
        let d = &placement.dimensions;
        match &surface.scaling {
            Some((_, viewport)) => viewport.set_destination(d.width as i32, d.height as i32),
            None => wl.set_buffer_scale((scale / SCALE_BASE).max(1) as i32),
        }
        buffer.buffer.attach_to(wl).map_err(|e| anyhow!("failed to attach buffer: {e:?}"))?;
        wl.damage_buffer(0, 0, buffer.dims.width as i32, buffer.dims.height as i32);
        wl.frame(&self.qh, wl.clone());
        wl.commit();
        Ok(())
    }

    fn destroy_surface(&mut self, surface: BarSurface) {
        drop(surface);
    }
}

// --- App ---

pub struct App {
    registry_state: RegistryState,
    output_state: OutputState,
    client: Client,
    overlay: Overlay<Client>,
    input: LineReader,
    exit: Option<Result<()>>,
}

impl App {
    fn identity(&self, output: &wl_output::WlOutput) -> OutputIdentity {
        self.output_state
            .info(output)
            .map(|info| OutputIdentity { name: info.name, description: info.description })
            .unwrap_or_default()
    }

    /// The first outcome sticks; later ones are dropped.
    fn finish(&mut self, result: Result<()>) {
        if self.exit.is_none() {
            self.exit = Some(result);
        }
    }

    fn check(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.finish(Err(e));
        }
    }

    fn read_input(&mut self, src: &File) -> PostAction {
        let mut src = src;
        let open = match self.input.fill(&mut src) {
            Ok(open) => open,
            Err(e) => {
                self.finish(Err(anyhow::Error::new(e).context("failed to read standard input")));
                return PostAction::Remove;
            }
        };

        match self.overlay.drain_input(&mut self.client, &mut self.input, open, Instant::now()) {
            Some(result) => {
                self.finish(result);
                PostAction::Remove
            }
            None => PostAction::Continue,
        }
    }
}

impl CompositorHandler for App {
    fn scale_factor_changed(&mut self, _: &Connection, _: &QueueHandle<Self>, surface: &wl_surface::WlSurface, factor: i32) {
        if self.client.fractional.is_some() {
            return;
        }
        let scale = factor.max(1) as u32 * SCALE_BASE;
        let result = self.overlay.scale_changed(&mut self.client, &surface.id(), scale);
        self.check(result);
    }
    fn transform_changed(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &wl_surface::WlSurface, _: wl_output::Transform) {}
    fn frame(&mut self, _: &Connection, _: &QueueHandle<Self>, surface: &wl_surface::WlSurface, _: u32) {
        let result = self.overlay.frame_done(&mut self.client, &surface.id());
        self.check(result);
    }
    fn surface_enter(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &wl_surface::WlSurface, _: &wl_output::WlOutput) {}
    fn surface_leave(&mut self, _: &Connection, _: &QueueHandle<Self>, _: &wl_surface::WlSurface, _: &wl_output::WlOutput) {}
}

impl OutputHandler for App {
    fn output_state(&mut self) -> &mut OutputState { &mut self.output_state }
    fn new_output(&mut self, _: &Connection, _: &QueueHandle<Self>, output: wl_output::WlOutput) {
        let identity = self.identity(&output);
        let result = self.overlay.output_added(&mut self.client, output, identity);
        self.check(result);
    }
    fn update_output(&mut self, _: &Connection, _: &QueueHandle<Self>, output: wl_output::WlOutput) {
        let identity = self.identity(&output);
        let result = self.overlay.output_updated(&mut self.client, &output, identity);
        self.check(result);
    }
    fn output_destroyed(&mut self, _: &Connection, _: &QueueHandle<Self>, output: wl_output::WlOutput) {
        self.overlay.output_removed(&mut self.client, &output);
    }
}

impl ShmHandler for App {
    fn shm_state(&mut self) -> &mut Shm { &mut self.client.shm }
}

impl LayerShellHandler for App {
    fn closed(&mut self, _: &Connection, _: &QueueHandle<Self>, layer: &LayerSurface) {
        self.overlay.surface_closed(&mut self.client, &layer.wl_surface().id());
    }
    fn configure(&mut self, _: &Connection, _: &QueueHandle<Self>, layer: &LayerSurface, configure: LayerSurfaceConfigure, _: u32) {
        debug!("Surface configured to {}x{}", configure.new_size.0, configure.new_size.1);
        let result = self.overlay.surface_configured(&mut self.client, &layer.wl_surface().id());
        self.check(result);
    }
}

impl ProvidesRegistryState for App {
    fn registry(&mut self) -> &mut RegistryState { &mut self.registry_state }
    registry_handlers![OutputState];
}

impl Dispatch<WpFractionalScaleManagerV1, ()> for App {
    fn event(_: &mut Self, _: &WpFractionalScaleManagerV1, _: wp_fractional_scale_manager_v1::Event, _: &(), _: &Connection, _: &QueueHandle<Self>) {}
}

impl Dispatch<WpFractionalScaleV1, wl_surface::WlSurface> for App {
    fn event(app: &mut Self, _: &WpFractionalScaleV1, event: wp_fractional_scale_v1::Event, surface: &wl_surface::WlSurface, _: &Connection, _: &QueueHandle<Self>) {
        if let wp_fractional_scale_v1::Event::PreferredScale { scale } = event {
            let result = app.overlay.scale_changed(&mut app.client, &surface.id(), scale);
            app.check(result);
        }
    }
}

impl Dispatch<WpViewporter, ()> for App {
    fn event(_: &mut Self, _: &WpViewporter, _: wp_viewporter::Event, _: &(), _: &Connection, _: &QueueHandle<Self>) {}
}

impl Dispatch<WpViewport, ()> for App {
    fn event(_: &mut Self, _: &WpViewport, _: wp_viewport::Event, _: &(), _: &Connection, _: &QueueHandle<Self>) {}
}

delegate_compositor!(App);
delegate_output!(App);
delegate_shm!(App);
delegate_layer!(App);
delegate_registry!(App);

// --- Main loop ---

pub fn run(config: Config) -> Result<()> {
    let conn = Connection::connect_to_env().context("failed to connect to the wayland display")?;
    let (globals, event_queue) = registry_queue_init::<App>(&conn).context("failed to read wayland globals")?;
    let qh = event_queue.handle();

    let mut event_loop: EventLoop<App> = EventLoop::try_new().context("failed to create event loop")?;
    WaylandSource::new(conn.clone(), event_queue)
        .insert(event_loop.handle())
        .map_err(|e| anyhow!("failed to watch the wayland connection: {}", e.error))?;

    let compositor = CompositorState::bind(&globals, &qh).context("wl_compositor is not available")?;
    let layer_shell = LayerShell::bind(&globals, &qh).context("zwlr_layer_shell_v1 is not available")?;
    let shm = Shm::bind(&globals, &qh).context("wl_shm is not available")?;
    let fractional = match (
        globals.bind::<WpFractionalScaleManagerV1, _, _>(&qh, 1..=1, ()),
        globals.bind::<WpViewporter, _, _>(&qh, 1..=1, ()),
    ) {
        (Ok(manager), Ok(viewporter)) => Some((manager, viewporter)),
        _ => {
            info!("Fractional scaling is not available, using integer buffer scale");
            None
        }
    };

    if sandbox::enabled(config.sandbox) {
        sandbox::restrict();
    }

    let stdin = File::from(io::stdin().as_fd().try_clone_to_owned().context("failed to open standard input")?);
    event_loop
        .handle()
        .insert_source(Generic::new(stdin, Interest::READ, Mode::Level), |_, stdin, app| {
            Ok(app.read_input(stdin.as_ref()))
        })
        .map_err(|e| anyhow!("failed to watch standard input: {}", e.error))?;

    let mut app = App {
        registry_state: RegistryState::new(&globals),
        output_state: OutputState::new(&globals, &qh),
        client: Client { compositor, layer_shell, shm, fractional, qh },
        overlay: Overlay::new(config),
        input: LineReader::default(),
        exit: None,
    };

    loop {
        let timeout = app.overlay.next_timeout(Instant::now());
        event_loop.dispatch(timeout, &mut app).context("event loop failed")?;
        app.overlay.tick(&mut app.client, Instant::now());
        if let Some(result) = app.exit.take() {
            if app.overlay.visibility() == Visibility::Visible {
                app.overlay.hide(&mut app.client);
            }
            conn.flush().context("failed to flush the wayland connection")?;
            return result;
        }
    }
}
