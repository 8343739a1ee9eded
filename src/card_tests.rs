use super::*;

#[test]
fn null_code_is_invalid() {
    assert_eq!(CardType::from_backend_code(None), CardType::Invalid);
}

#[test]
fn unknown_code_is_invalid() {
    assert_eq!(CardType::from_backend_code(Some(99)), CardType::Invalid);
    assert_eq!(CardType::from_backend_code(Some(-1)), CardType::Invalid);
}

#[test]
fn known_codes_decode() {
    assert_eq!(CardType::from_backend_code(Some(0)), CardType::ShutdownCard);
    assert_eq!(CardType::from_backend_code(Some(1)), CardType::ProxyCard);
    assert_eq!(CardType::from_backend_code(Some(2)), CardType::UserCard);
    assert_eq!(CardType::from_backend_code(Some(3)), CardType::TrainingCard);
}

#[test]
fn default_is_invalid() {
    assert_eq!(CardType::default(), CardType::Invalid);
}
