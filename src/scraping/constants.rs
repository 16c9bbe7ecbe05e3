// thirtyfour (selenium) inputs
pub const WINDOW_WIDTH: u32 = 1280;
pub const WINDOW_HEIGHT: u32 = 775;

// endpoint the page itself calls when the appointment date changes
pub const SLOTS_ENDPOINT_PATH: &str = "/Global/appointment/GetAvailableSlotsByDate";
pub const DATA_QUERY_PARAM: &str = "data";
pub const DATE_QUERY_PARAM: &str = "appointmentDate";

// HTML element selectors used in automation
pub const BUTTON_SUBMIT_ID: &str = "btnSubmit";

// Kendo widgets are only reachable through jQuery's data store, so they are
// driven with injected scripts
pub const DATE_PICKER_READY_JS: &str = r#"
    if (typeof window.jQuery === 'undefined') { return false; }
    return !!window.jQuery('.k-datepicker:visible .k-input').data('kendoDatePicker');
"#;

pub const DATE_PICKER_VALUE_JS: &str = r#"
    if (typeof window.jQuery === 'undefined') { return null; }
    return window.jQuery('.k-datepicker:visible .k-input').val() || null;
"#;

pub const DATE_PICKER_SET_JS: &str = r#"
    const picker = window.jQuery('.k-datepicker:visible .k-input').data('kendoDatePicker');
    picker.value(arguments[0]);
    picker.trigger('change');
"#;

pub const AVAIL_DATES_JS: &str = r#"
    return window.availDates || null;
"#;

pub const DROPDOWN_READY_JS: &str = r#"
    if (typeof window.jQuery === 'undefined') { return false; }
    return !!window.jQuery('.k-dropdown:visible > .form-control').data('kendoDropDownList');
"#;

pub const DROPDOWN_VALUE_JS: &str = r#"
    const dropdown = window.jQuery('.k-dropdown:visible > .form-control').data('kendoDropDownList');
    return dropdown ? (dropdown.value() || null) : null;
"#;

pub const DROPDOWN_SET_VALUE_JS: &str = r#"
    window.jQuery('.k-dropdown:visible > .form-control').data('kendoDropDownList').value(arguments[0]);
"#;

pub const DROPDOWN_SET_SOURCE_JS: &str = r#"
    window.jQuery('.k-dropdown:visible > .form-control').data('kendoDropDownList').setDataSource(arguments[0]);
"#;

pub const DROPDOWN_CLEAR_JS: &str = r#"
    const dropdown = window.jQuery('.k-dropdown:visible > .form-control').data('kendoDropDownList');
    dropdown.value(undefined);
    dropdown.setDataSource([]);
"#;

// hides the blocking preloader and takes over the page's date change hook,
// slot fetching is done by the session itself
pub const PREPARE_PAGE_JS: &str = r#"
    if (typeof window.jQuery !== 'undefined') { window.jQuery('.preloader').hide(); }
    window.OnAppointmentdateChange = function () {};
"#;

pub const ANNOUNCE_JS: &str = r#"
    window.speechSynthesis.speak(new SpeechSynthesisUtterance(arguments[0]));
"#;
