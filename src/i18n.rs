//! English/Bulgarian UI strings and language negotiation.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const LANGUAGE_COOKIE: &str = "lang";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Bg,
}

impl Language {
    pub const SUPPORTED: [Language; 2] = [Language::En, Language::Bg];

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Language::En),
            "bg" => Some(Language::Bg),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Bg => "bg",
        }
    }

    /// Best supported match for an `Accept-Language` header, honouring q-values.
    pub fn from_accept_language(header: &str) -> Option<Self> {
        let mut best: Option<(Language, f32)> = None;
        for part in header.split(',') {
            let mut pieces = part.trim().split(';');
            let tag = pieces.next().unwrap_or("").trim();
            let quality = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            let primary = tag.split('-').next().unwrap_or("");
            if let Some(language) = Language::from_code(primary) {
                if quality > 0.0 && best.map_or(true, |(_, q)| quality > q) {
                    best = Some((language, quality));
                }
            }
        }
        best.map(|(language, _)| language)
    }

    /// Cookie choice wins, then the account preference, then the browser, then the default.
    pub fn resolve(
        cookie: Option<&str>,
        account: Option<Language>,
        accept_language: Option<&str>,
        default: Language,
    ) -> Self {
        cookie
            .and_then(Language::from_code)
            .or(account)
            .or_else(|| accept_language.and_then(Language::from_accept_language))
            .unwrap_or(default)
    }

    pub fn is_bg(&self) -> bool {
        matches!(self, Language::Bg)
    }

    /// Translates an English UI label. Unknown labels fall back to English.
    pub fn t(&self, key: &'static str) -> &'static str {
        match self {
            Language::En => key,
            Language::Bg => bulgarian(key).unwrap_or(key),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn bulgarian(key: &str) -> Option<&'static str> {
    let text = match key {
        "Inventory Management" => "Управление на склад",
        "Dashboard" => "Табло",
        "Products" => "Продукти",
        "Product" => "Продукт",
        "Categories" => "Категории",
        "Category" => "Категория",
        "Scanner" => "Скенер",
        "Users" => "Потребители",
        "Profile" => "Профил",
        "Logout" => "Изход",
        "Login" => "Вход",
        "Username or email" => "Потребителско име или имейл",
        "Username" => "Потребителско име",
        "Email" => "Имейл",
        "Password" => "Парола",
        "Remember me" => "Запомни ме",
        "Two-factor authentication" => "Двуфакторна автентикация",
        "Verification code" => "Код за потвърждение",
        "Verify" => "Потвърди",
        "Enable" => "Активирай",
        "Disable" => "Деактивирай",
        "Enabled" => "Активирана",
        "Disabled" => "Деактивирана",
        "Scan this QR code with your authenticator app" => {
            "Сканирайте този QR код с приложението за автентикация"
        }
        "Secret" => "Таен ключ",
        "Total products" => "Общо продукти",
        "Low stock" => "Ниска наличност",
        "Inventory value" => "Стойност на склада",
        "Recent movements" => "Последни движения",
        "Low stock products" => "Продукти с ниска наличност",
        "Search" => "Търсене",
        "All categories" => "Всички категории",
        "Low stock only" => "Само ниска наличност",
        "Filter" => "Филтър",
        "Add product" => "Добави продукт",
        "Edit product" => "Редактирай продукт",
        "Edit" => "Редактирай",
        "Delete" => "Изтрий",
        "Save" => "Запази",
        "Cancel" => "Отказ",
        "Name" => "Име",
        "Description" => "Описание",
        "SKU" => "Артикулен номер",
        "Barcode" => "Баркод",
        "RFID tag" => "RFID етикет",
        "Quantity" => "Количество",
        "Minimum stock level" => "Минимална наличност",
        "Unit price" => "Единична цена",
        "Location" => "Местоположение",
        "Total value" => "Обща стойност",
        "Actions" => "Действия",
        "None" => "Няма",
        "Previous" => "Предишна",
        "Next" => "Следваща",
        "Page" => "Страница",
        "of" => "от",
        "Stock movement" => "Движение на стока",
        "Movement type" => "Вид движение",
        "Stock in" => "Заприхождаване",
        "Stock out" => "Изписване",
        "Adjustment" => "Корекция",
        "Notes" => "Бележки",
        "Reference" => "Референция",
        "Record movement" => "Запиши движение",
        "Movement history" => "История на движенията",
        "Date" => "Дата",
        "Type" => "Вид",
        "Change" => "Промяна",
        "Before" => "Преди",
        "After" => "След",
        "User" => "Потребител",
        "Ledger consistent" => "Дневникът е последователен",
        "Ledger inconsistent" => "Дневникът е непоследователен",
        "Show barcode" => "Покажи баркод",
        "Print" => "Печат",
        "Add category" => "Добави категория",
        "Name (English)" => "Име (английски)",
        "Name (Bulgarian)" => "Име (български)",
        "Lookup" => "Търсене по код",
        "Code" => "Код",
        "Scan or enter a barcode, RFID tag or SKU" => {
            "Сканирайте или въведете баркод, RFID етикет или артикулен номер"
        }
        "Find" => "Намери",
        "Add stock" => "Добави наличност",
        "Remove stock" => "Извади наличност",
        "Roles" => "Роли",
        "Active" => "Активен",
        "Last login" => "Последен вход",
        "Language" => "Език",
        "Recent activity" => "Последна активност",
        "Action" => "Действие",
        "No records" => "Няма записи",
        "Yes" => "Да",
        "No" => "Не",
        "Quantity is too large" => "Количеството е твърде голямо",
        "Invalid username or password" => "Невалидно потребителско име или парола",
        "This account is disabled" => "Този акаунт е деактивиран",
        "Please log in again" => "Моля, влезте отново",
        "Invalid verification code" => "Невалиден код за потвърждение",
        "You have been logged out" => "Излязохте от системата",
        "Registration is disabled. Ask an administrator for an account." => {
            "Регистрацията е изключена. Поискайте акаунт от администратор."
        }
        "Two-factor authentication enabled" => "Двуфакторната автентикация е активирана",
        "Two-factor authentication disabled" => "Двуфакторната автентикация е деактивирана",
        "Name and SKU are required" => "Името и артикулният номер са задължителни",
        "Quantity must be a whole number" => "Количеството трябва да е цяло число",
        "Quantity must be a whole number of zero or more" => "Количеството трябва да е цяло число, нула или повече",
        "Quantity must be greater than zero" => "Количеството трябва да е по-голямо от нула",
        "Minimum stock level must be a whole number of zero or more" => {
            "Минималната наличност трябва да е цяло число, нула или повече"
        }
        "Unit price must be a number of zero or more" => "Единичната цена трябва да е число, нула или повече",
        "Insufficient stock" => "Недостатъчна наличност",
        "available" => "налични",
        "requested" => "поискани",
        "already exists" => "вече съществува",
        "Invalid movement type" => "Невалиден вид движение",
        "Product not found" => "Продуктът не е намерен",
        "Something went wrong. Please try again." => "Възникна грешка. Моля, опитайте отново.",
        "Product created" => "Продуктът е създаден",
        "Product updated" => "Продуктът е обновен",
        "Product deleted" => "Продуктът е изтрит",
        "Stock updated" => "Наличността е обновена",
        "Stock is at or below the minimum level" => "Наличността е на или под минималното ниво",
        "Both names are required" => "И двете имена са задължителни",
        "Category created" => "Категорията е създадена",
        "No product found for code" => "Няма продукт с код",
        "Product found" => "Продуктът е намерен",
        "Invalid action" => "Невалидно действие",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes() {
        assert_eq!(Language::from_code("BG"), Some(Language::Bg));
        assert_eq!(Language::from_code(" en "), Some(Language::En));
        assert_eq!(Language::from_code("de"), None);
    }

    #[test]
    fn accept_language_respects_quality() {
        assert_eq!(Language::from_accept_language("bg-BG,bg;q=0.9,en;q=0.8"), Some(Language::Bg));
        assert_eq!(Language::from_accept_language("de-DE, en;q=0.5, bg;q=0.7"), Some(Language::Bg));
        assert_eq!(Language::from_accept_language("fr, de"), None);
        assert_eq!(Language::from_accept_language("bg;q=0"), None);
    }

    #[test]
    fn cookie_beats_account_beats_browser() {
        assert_eq!(
            Language::resolve(Some("bg"), Some(Language::En), Some("en"), Language::En),
            Language::Bg
        );
        assert_eq!(
            Language::resolve(None, Some(Language::Bg), Some("en"), Language::En),
            Language::Bg
        );
        assert_eq!(Language::resolve(Some("xx"), None, Some("bg"), Language::En), Language::Bg);
        assert_eq!(Language::resolve(None, None, None, Language::Bg), Language::Bg);
    }

    #[test]
    fn translation_falls_back_to_english() {
        assert_eq!(Language::Bg.t("Products"), "Продукти");
        assert_eq!(Language::Bg.t("Not a label"), "Not a label");
        assert_eq!(Language::En.t("Products"), "Products");
    }
}
