//! Canned prompts offered above the input bar

/// One quick action: selecting it sends `message` as if the user typed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub id: &'static str,
    pub label: &'static str,
    pub message: &'static str,
}

pub const QUICK_ACTIONS: &[QuickAction] = &[
    QuickAction {
        id: "models",
        label: "Explore Models",
        message: "What models does Hyundai currently offer?",
    },
    QuickAction {
        id: "test-drive",
        label: "Schedule Test Drive",
        message: "I'd like to schedule a test drive",
    },
    QuickAction {
        id: "pricing",
        label: "Pricing Information",
        message: "Can you tell me about the pricing for Hyundai models?",
    },
    QuickAction {
        id: "dealership",
        label: "Find Dealership",
        message: "Where is the nearest Hyundai dealership?",
    },
    QuickAction {
        id: "warranty",
        label: "Warranty Info",
        message: "What warranty options does Hyundai offer?",
    },
    QuickAction {
        id: "offers",
        label: "Special Offers",
        message: "Are there any special offers or promotions currently available?",
    },
];

/// Preference key remembering whether the user collapsed the quick actions
pub const HIDDEN_PREFERENCE: &str = "quick_actions_hidden";

/// Look up an action by its 1-based position in the menu
pub fn by_position(position: usize) -> Option<&'static QuickAction> {
    position.checked_sub(1).and_then(|i| QUICK_ACTIONS.get(i))
}

pub fn by_id(id: &str) -> Option<&'static QuickAction> {
    QUICK_ACTIONS.iter().find(|a| a.id == id)
}
