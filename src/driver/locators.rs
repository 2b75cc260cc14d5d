//! WhatsApp Web locator catalog.
//!
//! The markup is not a stable contract, so anything that must be found in
//! the page is expressed as an ordered list of candidates tried first to
//! last. Keeping the catalog in one place makes selector churn a one-file
//! fix.

use super::Locator;

/// Base URL of the driven UI.
pub const WHATSAPP_WEB_URL: &str = "https://web.whatsapp.com";

/// Present once the authenticated main screen is up (any chat textbox).
pub const AUTH_READY: Locator = Locator::Css("div[role=\"textbox\"]");

/// The QR code shown to unauthenticated sessions.
pub const QR_CODE: Locator =
    Locator::Css("div[data-testid=\"qrcode\"], canvas[aria-label*=\"Scan\"]");

/// Titles of the rows in the visible conversation list.
pub const CHAT_LIST_TITLES: Locator =
    Locator::Css("#pane-side div[role=\"listitem\"] span[title]");

/// Titles of "start new conversation" / search result entries, which show
/// unsaved numbers in whatever display format the UI picked.
pub const UNSAVED_ENTRY_TITLES: Locator = Locator::Css(
    "div[data-testid=\"chat-list-search\"] span[title], \
     div[aria-label] div[role=\"listitem\"] span[title]",
);

/// Marks an open conversation: the message composer.
pub const CONVERSATION_OPEN: Locator =
    Locator::Css("footer div[contenteditable=\"true\"]");

/// Candidate locators for the message-entry control, in priority order.
pub const COMPOSER_CANDIDATES: &[Locator] = &[
    Locator::Css("footer div[contenteditable=\"true\"][data-tab=\"10\"]"),
    Locator::Css("footer div[role=\"textbox\"]"),
    Locator::XPath("//div[@contenteditable='true'][@title='Type a message']"),
];

/// Candidate locators for the send control, in priority order.
pub const SEND_CANDIDATES: &[Locator] = &[
    Locator::Css("span[data-icon=\"send\"]"),
    Locator::Css("button[aria-label=\"Send\"]"),
    Locator::XPath("//button[.//span[@data-icon='send']]"),
];
