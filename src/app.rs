use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::layout::{Position, Rect};
use ratatui::widgets::ListState;
use tracing::{debug, warn};
use webbrowser::Browser;

use crate::controller::Controller;
use crate::form::{ActivityForm, FormField};
use crate::map::{CanvasMap, MapSurface};
use crate::runtime::AppEvent;
use crate::storage::BlobStore;
use crate::workout::{Activity, ActivityId, ActivityKind, Location};

pub type TreadController = Controller<CanvasMap, Box<dyn BlobStore>>;

/// Rows each list item takes: the title and the metrics line.
pub const LIST_ITEM_HEIGHT: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Browsing,
    Form,
    ConfirmClear,
    Help,
}

/// Which half of the screen the arrow keys drive while browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    List,
    Map,
}

impl Pane {
    fn toggled(self) -> Self {
        match self {
            Pane::List => Pane::Map,
            Pane::Map => Pane::List,
        }
    }
}

pub fn osm_url(location: Location, zoom: f64) -> String {
    format!(
        "https://www.openstreetmap.org/?mlat={lat:.5}&mlon={lng:.5}#map={z}/{lat:.5}/{lng:.5}",
        lat = location.lat,
        lng = location.lng,
        z = zoom.round() as u8,
    )
}

/// Everything the terminal front end needs between two events.
pub struct App {
    pub controller: TreadController,
    pub state: AppState,
    pub pane: Pane,
    pub list_state: ListState,
    pub focused: Option<ActivityId>,
    /// Map crosshair; unknown until the first position arrives.
    pub cursor: Option<Location>,
    pub form: Option<ActivityForm>,
    pub default_kind: ActivityKind,
    pub status: Option<String>,
    /// Inner areas from the last draw, used to route mouse clicks.
    pub map_area: Rect,
    pub list_area: Rect,
    pub should_quit: bool,
}

impl App {
    pub fn new(controller: TreadController, default_kind: ActivityKind) -> Self {
        let mut list_state = ListState::default();
        if controller.activities().len() > 0 {
            list_state.select(Some(0));
        }
        Self {
            controller,
            state: AppState::Browsing,
            pane: Pane::List,
            list_state,
            focused: None,
            cursor: None,
            form: None,
            default_kind,
            status: None,
            map_area: Rect::default(),
            list_area: Rect::default(),
            should_quit: false,
        }
    }

    /// Activities in list order, newest first.
    pub fn listed(&self) -> impl Iterator<Item = &Activity> + '_ {
        self.controller.activities().rev()
    }

    pub fn selected_activity(&self) -> Option<&Activity> {
        self.list_state
            .selected()
            .and_then(|i| self.listed().nth(i))
    }

    pub fn on_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => self.on_key(key),
            AppEvent::Mouse(mouse) => self.on_mouse(mouse),
            AppEvent::Located(location) => {
                self.controller.map_loaded(location);
                self.cursor = Some(location);
            }
            AppEvent::LocationFailed(err) => self.controller.location_unavailable(&err),
            AppEvent::Resize | AppEvent::Tick => {}
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.state {
            AppState::Browsing => self.on_browsing_key(key),
            AppState::Form => self.on_form_key(key),
            AppState::ConfirmClear => {
                if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                    self.clear_all();
                }
                self.state = AppState::Browsing;
            }
            AppState::Help => self.state = AppState::Browsing,
        }
    }

    fn on_browsing_key(&mut self, key: KeyEvent) {
        self.status = None;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('?') => self.state = AppState::Help,
            KeyCode::Tab | KeyCode::BackTab => self.pane = self.pane.toggled(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.controller.map_mut().zoom_in(),
            KeyCode::Char('-') => self.controller.map_mut().zoom_out(),
            KeyCode::Char('d') | KeyCode::Delete => self.delete_selected(),
            KeyCode::Char('o') => self.open_selected_in_browser(),
            KeyCode::Char('X') => {
                if self.controller.activities().len() > 0 {
                    self.state = AppState::ConfirmClear;
                }
            }
            code => match self.pane {
                Pane::List => self.on_list_key(code),
                Pane::Map => self.on_map_key(code),
            },
        }
    }

    fn on_list_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Up | KeyCode::Char('k') => self.select_prev(),
            KeyCode::Down | KeyCode::Char('j') => self.select_next(),
            KeyCode::Home => self.select(0),
            KeyCode::End => {
                let last = self.controller.activities().len().saturating_sub(1);
                self.select(last)
            }
            KeyCode::Enter => self.focus_selected(),
            _ => {}
        }
    }

    fn on_map_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Up => self.move_cursor(0.0, 1.0),
            KeyCode::Down => self.move_cursor(0.0, -1.0),
            KeyCode::Left => self.move_cursor(-1.0, 0.0),
            KeyCode::Right => self.move_cursor(1.0, 0.0),
            KeyCode::Enter => {
                if let Some(cursor) = self.cursor {
                    self.open_form(cursor);
                }
            }
            _ => {}
        }
    }

    fn on_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => return self.cancel_form(),
            KeyCode::Enter => return self.submit_form(),
            _ => {}
        }
        let Some(form) = self.form.as_mut() else {
            self.state = AppState::Browsing;
            return;
        };
        match key.code {
            KeyCode::Tab | KeyCode::Down => form.focus_next(),
            KeyCode::BackTab | KeyCode::Up => form.focus_prev(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')
                if form.focus == FormField::Kind =>
            {
                form.toggle_kind()
            }
            KeyCode::Char(c) => {
                form.push_char(c);
            }
            _ => {}
        }
    }

    pub fn on_mouse(&mut self, mouse: MouseEvent) {
        if matches!(self.state, AppState::Help | AppState::ConfirmClear) {
            return;
        }
        let at = Position::new(mouse.column, mouse.row);
        let on_map = self.controller.is_map_ready() && self.map_area.contains(at);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) if on_map => {
                let map = self.controller.map();
                if let Some(location) = map.location_at(self.map_area, mouse.column, mouse.row) {
                    self.cursor = Some(location);
                    self.open_form(location);
                }
            }
            MouseEventKind::Down(MouseButton::Left) if self.list_area.contains(at) => {
                let row = (mouse.row - self.list_area.y) / LIST_ITEM_HEIGHT;
                let index = self.list_state.offset() + usize::from(row);
                if index < self.controller.activities().len() {
                    self.select(index);
                    self.focus_selected();
                }
            }
            MouseEventKind::ScrollUp if on_map => self.controller.map_mut().zoom_in(),
            MouseEventKind::ScrollDown if on_map => self.controller.map_mut().zoom_out(),
            _ => {}
        }
    }

    /// Shows the form for a new activity at `location`. If it is already
    /// open only its location moves, keeping what was typed.
    pub fn open_form(&mut self, location: Location) {
        match self.form.as_mut() {
            Some(form) => form.location = location,
            None => self.form = Some(ActivityForm::new(location, self.default_kind)),
        }
        self.state = AppState::Form;
        debug!(%location, "form opened");
    }

    pub fn cancel_form(&mut self) {
        self.form = None;
        self.state = AppState::Browsing;
    }

    pub fn submit_form(&mut self) {
        let Some(form) = self.form.as_mut() else {
            return;
        };
        let result = self.controller.submit_new_activity(
            form.kind,
            &form.distance,
            &form.duration,
            form.extra(),
            form.location,
        );
        match result {
            Ok(activity) => {
                self.status = Some(format!("Logged {}", activity.description()));
                self.form = None;
                self.state = AppState::Browsing;
                self.select(0);
            }
            Err(err) => {
                self.status = Some(err.to_string());
                form.reject(err);
            }
        }
    }

    pub fn select(&mut self, index: usize) {
        let len = self.controller.activities().len();
        self.list_state
            .select(if len == 0 { None } else { Some(index.min(len - 1)) });
    }

    pub fn select_next(&mut self) {
        let next = self.list_state.selected().map_or(0, |i| i + 1);
        self.select(next);
    }

    pub fn select_prev(&mut self) {
        let prev = self.list_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.select(prev);
    }

    pub fn focus_selected(&mut self) {
        let Some(activity) = self.selected_activity() else {
            return;
        };
        let (id, location) = (activity.id().clone(), activity.location());
        if self.controller.focus_activity(&id) {
            self.cursor = Some(location);
            self.focused = Some(id);
        }
    }

    pub fn delete_selected(&mut self) {
        let Some(id) = self.selected_activity().map(|a| a.id().clone()) else {
            return;
        };
        if self.controller.delete_activity(&id) {
            if self.focused.as_ref() == Some(&id) {
                self.focused = None;
            }
            self.status = Some("Activity deleted".to_string());
            self.select(self.list_state.selected().unwrap_or(0));
        }
    }

    pub fn clear_all(&mut self) {
        self.controller.clear_all();
        self.focused = None;
        self.list_state.select(None);
        self.status = Some("All activities cleared".to_string());
    }

    pub fn open_selected_in_browser(&mut self) {
        let Some(location) = self.selected_activity().map(Activity::location) else {
            return;
        };
        let url = osm_url(location, self.controller.map().current_zoom());
        if !Browser::is_available() {
            self.status = Some(url);
            return;
        }
        if let Err(err) = webbrowser::open(&url) {
            warn!(%err, "could not open browser");
            self.status = Some(format!("could not open browser: {err}"));
        }
    }

    /// Moves the crosshair by whole terminal cells, panning the map when
    /// it leaves the viewport.
    pub fn move_cursor(&mut self, dx: f64, dy: f64) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let cols = f64::from(self.map_area.width.max(1));
        let rows = f64::from(self.map_area.height.max(1));
        let map = self.controller.map_mut();
        let (lng_span, lat_span) = map.span();

        let mut lng = cursor.lng + dx * lng_span / cols;
        if lng > 180.0 {
            lng -= 360.0;
        } else if lng < -180.0 {
            lng += 360.0;
        }
        let next = Location::new((cursor.lat + dy * lat_span / rows).clamp(-90.0, 90.0), lng);

        if !map.is_visible(next) {
            let zoom = map.current_zoom();
            map.recenter(next, zoom);
        }
        self.cursor = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Persistence;
    use crate::controller::DEFAULT_ZOOM;
    use crate::geolocation::GeoError;
    use crate::storage::MemoryBlobStore;

    fn app_with(store: MemoryBlobStore) -> App {
        let persistence = Persistence::new(Box::new(store) as Box<dyn BlobStore>);
        let mut controller = Controller::new(CanvasMap::new(), persistence, DEFAULT_ZOOM);
        controller.startup();
        App::new(controller, ActivityKind::Running)
    }

    fn app() -> App {
        app_with(MemoryBlobStore::new())
    }

    fn press(app: &mut App, code: KeyCode) {
        app.on_event(AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)));
    }

    fn type_str(app: &mut App, s: &str) {
        for c in s.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn located(app: &mut App) {
        app.on_event(AppEvent::Located(Location::new(39.7, -105.0)));
        app.map_area = Rect::new(40, 1, 60, 20);
        app.list_area = Rect::new(1, 1, 38, 20);
    }

    fn log_run(app: &mut App, distance: &str, duration: &str, cadence: &str) {
        app.pane = Pane::Map;
        press(app, KeyCode::Enter);
        type_str(app, distance);
        press(app, KeyCode::Tab);
        type_str(app, duration);
        press(app, KeyCode::Tab);
        type_str(app, cadence);
        press(app, KeyCode::Enter);
    }

    #[test]
    fn test_located_readies_map_and_cursor() {
        let mut app = app();
        assert!(!app.controller.is_map_ready());
        located(&mut app);
        assert!(app.controller.is_map_ready());
        assert_eq!(app.cursor, Some(Location::new(39.7, -105.0)));
    }

    #[test]
    fn test_location_failure_keeps_list_usable() {
        let mut app = app();
        app.on_event(AppEvent::LocationFailed(GeoError::Unavailable));
        assert!(app.controller.last_warning().is_some());
        // no cursor, so the map pane cannot open a form
        app.pane = Pane::Map;
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state, AppState::Browsing);
        assert!(app.form.is_none());
    }

    #[test]
    fn test_log_run_through_form() {
        let mut app = app();
        located(&mut app);
        log_run(&mut app, "5", "25", "170");

        assert_eq!(app.state, AppState::Browsing);
        assert!(app.form.is_none());
        assert_eq!(app.controller.activities().len(), 1);
        let run = app.selected_activity().unwrap();
        assert_eq!(run.pace_min_per_km(), Some(5.0));
        assert_eq!(run.location(), Location::new(39.7, -105.0));
        assert_eq!(app.controller.map().marker_count(), 1);
        assert!(app.status.as_deref().unwrap().starts_with("Logged Running on"));
    }

    #[test]
    fn test_home_and_end_jump_through_list() {
        let mut app = app();
        located(&mut app);
        for distance in ["3", "4", "5"] {
            log_run(&mut app, distance, "30", "170");
        }
        app.pane = Pane::List;

        press(&mut app, KeyCode::End);
        assert_eq!(app.list_state.selected(), Some(2));
        assert_eq!(app.selected_activity().unwrap().distance_km(), 3.0);

        press(&mut app, KeyCode::Home);
        assert_eq!(app.list_state.selected(), Some(0));
        assert_eq!(app.selected_activity().unwrap().distance_km(), 5.0);
    }

    #[test]
    fn test_invalid_form_stays_open() {
        let mut app = app();
        located(&mut app);
        log_run(&mut app, "-5", "25", "170");

        assert_eq!(app.state, AppState::Form);
        assert_eq!(app.controller.activities().len(), 0);
        let form = app.form.as_ref().unwrap();
        assert_eq!(form.focus, FormField::Distance);
        assert!(form.error.is_some());
        assert_eq!(
            app.status.as_deref(),
            Some("distance must be a positive number")
        );
    }

    #[test]
    fn test_letters_are_not_typed_into_form() {
        let mut app = app();
        located(&mut app);
        app.open_form(Location::new(1.0, 1.0));
        type_str(&mut app, "1a2");
        assert_eq!(app.form.as_ref().unwrap().distance, "12");
    }

    #[test]
    fn test_log_ride_with_negative_elevation() {
        let mut app = app();
        located(&mut app);
        app.open_form(Location::new(1.0, 1.0));
        press(&mut app, KeyCode::BackTab);
        press(&mut app, KeyCode::Char(' '));
        assert_eq!(app.form.as_ref().unwrap().kind, ActivityKind::Cycling);
        press(&mut app, KeyCode::Tab);
        type_str(&mut app, "30");
        press(&mut app, KeyCode::Tab);
        type_str(&mut app, "60");
        press(&mut app, KeyCode::Tab);
        type_str(&mut app, "-40");
        press(&mut app, KeyCode::Enter);

        let ride = app.selected_activity().unwrap();
        assert_eq!(ride.kind(), ActivityKind::Cycling);
        assert_eq!(ride.speed_km_per_h(), Some(30.0));
        assert_eq!(ride.elevation_gain_m(), Some(-40.0));
    }

    #[test]
    fn test_escape_cancels_form() {
        let mut app = app();
        located(&mut app);
        app.open_form(Location::new(1.0, 1.0));
        type_str(&mut app, "5");
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.state, AppState::Browsing);
        assert!(app.form.is_none());
        assert!(!app.should_quit);
    }

    #[test]
    fn test_list_is_newest_first_and_focus_counts_clicks() {
        let mut app = app();
        located(&mut app);
        log_run(&mut app, "5", "25", "170");
        log_run(&mut app, "10", "50", "165");
        app.pane = Pane::List;

        assert_eq!(app.selected_activity().unwrap().distance_km(), 10.0);
        press(&mut app, KeyCode::Down);
        let older = app.selected_activity().unwrap().id().clone();
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.focused.as_ref(), Some(&older));
        let focused = app.controller.store().find_by_id(&older).unwrap();
        assert_eq!(focused.click_count(), 1);
        assert_eq!(app.controller.map().center(), focused.location());

        // selection does not run past the end
        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.list_state.selected(), Some(1));
    }

    #[test]
    fn test_delete_selected() {
        let mut app = app();
        located(&mut app);
        log_run(&mut app, "5", "25", "170");
        log_run(&mut app, "10", "50", "165");
        app.pane = Pane::List;
        press(&mut app, KeyCode::End);
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('d'));

        assert_eq!(app.controller.activities().len(), 1);
        assert_eq!(app.controller.map().marker_count(), 1);
        assert!(app.focused.is_none());
        assert_eq!(app.list_state.selected(), Some(0));

        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.list_state.selected(), None);
        // nothing left to delete
        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.controller.activities().len(), 0);
    }

    #[test]
    fn test_clear_needs_confirmation() {
        let mut app = app();
        located(&mut app);
        log_run(&mut app, "5", "25", "170");

        press(&mut app, KeyCode::Char('X'));
        assert_eq!(app.state, AppState::ConfirmClear);
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.state, AppState::Browsing);
        assert_eq!(app.controller.activities().len(), 1);

        press(&mut app, KeyCode::Char('X'));
        press(&mut app, KeyCode::Char('y'));
        assert_eq!(app.controller.activities().len(), 0);
        assert_eq!(app.controller.map().marker_count(), 0);

        // nothing to clear, no confirmation
        press(&mut app, KeyCode::Char('X'));
        assert_eq!(app.state, AppState::Browsing);
    }

    #[test]
    fn test_help_and_quit() {
        let mut app = app();
        press(&mut app, KeyCode::Char('?'));
        assert_eq!(app.state, AppState::Help);
        press(&mut app, KeyCode::Char('q'));
        assert_eq!(app.state, AppState::Browsing);
        assert!(!app.should_quit);
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[test]
    fn test_ctrl_c_quits_from_form() {
        let mut app = app();
        located(&mut app);
        app.open_form(Location::new(0.0, 0.0));
        app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }

    #[test]
    fn test_zoom_keys() {
        let mut app = app();
        located(&mut app);
        press(&mut app, KeyCode::Char('-'));
        assert_eq!(app.controller.map().current_zoom(), DEFAULT_ZOOM - 1.0);
        press(&mut app, KeyCode::Char('+'));
        press(&mut app, KeyCode::Char('+'));
        assert_eq!(app.controller.map().current_zoom(), DEFAULT_ZOOM + 1.0);
    }

    fn click(app: &mut App, column: u16, row: u16) {
        app.on_event(AppEvent::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }));
    }

    #[test]
    fn test_map_click_opens_form_at_clicked_location() {
        let mut app = app();
        located(&mut app);
        click(&mut app, 70, 10);
        assert_eq!(app.state, AppState::Form);
        let form = app.form.as_ref().unwrap();
        let expected = app
            .controller
            .map()
            .location_at(app.map_area, 70, 10)
            .unwrap();
        assert_eq!(form.location, expected);

        // a second click moves the pending location and keeps the input
        type_str(&mut app, "7");
        click(&mut app, 45, 3);
        let form = app.form.as_ref().unwrap();
        assert_eq!(form.distance, "7");
        assert_ne!(form.location, expected);
    }

    #[test]
    fn test_map_click_ignored_before_location() {
        let mut app = app();
        app.map_area = Rect::new(40, 1, 60, 20);
        click(&mut app, 70, 10);
        assert_eq!(app.state, AppState::Browsing);
        assert!(app.form.is_none());
    }

    #[test]
    fn test_list_click_focuses_row() {
        let mut app = app();
        located(&mut app);
        log_run(&mut app, "5", "25", "170");
        log_run(&mut app, "10", "50", "165");

        // second item starts two rows into the list
        click(&mut app, 5, 1 + LIST_ITEM_HEIGHT);
        assert_eq!(app.list_state.selected(), Some(1));
        let focused = app.focused.clone().unwrap();
        assert_eq!(
            app.controller.store().find_by_id(&focused).unwrap().distance_km(),
            5.0
        );
    }

    #[test]
    fn test_map_cursor_keys_pan_at_edge() {
        let mut app = app();
        located(&mut app);
        app.pane = Pane::Map;
        let start = app.cursor.unwrap();
        press(&mut app, KeyCode::Right);
        assert!(app.cursor.unwrap().lng > start.lng);

        let before = app.controller.map().center();
        for _ in 0..40 {
            press(&mut app, KeyCode::Right);
        }
        assert!(app.controller.map().center().lng > before.lng);
        assert!(app.controller.map().is_visible(app.cursor.unwrap()));
    }

    #[test]
    fn test_osm_url() {
        assert_eq!(
            osm_url(Location::new(39.7, -105.0), 13.0),
            "https://www.openstreetmap.org/?mlat=39.70000&mlon=-105.00000#map=13/39.70000/-105.00000"
        );
    }
}
