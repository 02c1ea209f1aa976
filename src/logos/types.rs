use quick_xml::escape::escape;

/// A resolved logo reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoRef {
  /// Logo confirmed on the remote service
  Remote { url: String },
  /// Generated placeholder
  Fallback(FallbackLogo),
}

impl LogoRef {
  pub fn is_fallback(&self) -> bool {
    matches!(self, LogoRef::Fallback(_))
  }

  /// Image source string: the remote URL or an inline SVG data URI.
  pub fn as_src(&self) -> String {
    match self {
      LogoRef::Remote { url } => url.clone(),
      LogoRef::Fallback(logo) => logo.to_data_uri(),
    }
  }
}

/// Initials-based placeholder logo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackLogo {
  pub initials: String,
  /// Background color, `#rrggbb`
  pub color: String,
  /// Accessible label (company name or a generic label)
  pub label: String,
}

impl FallbackLogo {
  /// Render as a `data:image/svg+xml` URI.
  pub fn to_data_uri(&self) -> String {
    let svg = format!(
      "<svg xmlns='http://www.w3.org/2000/svg' width='64' height='64' viewBox='0 0 64 64' role='img' aria-label='{label}'>\
       <rect width='64' height='64' rx='8' fill='{color}'/>\
       <text x='32' y='40' font-family='sans-serif' font-size='24' font-weight='bold' fill='#ffffff' text-anchor='middle'>{initials}</text>\
       </svg>",
      label = escape(&self.label),
      color = self.color,
      initials = escape(&self.initials),
    );
    format!("data:image/svg+xml;utf8,{}", urlencoding::encode(&svg))
  }
}
