use super::*;

fn valid_form() -> RegistrationForm {
    RegistrationForm {
        first_name: " Aisyah ".into(),
        last_name: "Rahman".into(),
        student_id: "20231234".into(),
        email: "  Aisyah@UTS.edu.my ".into(),
        password: "secret1".into(),
        confirm_password: "secret1".into(),
        accepted_terms: true,
    }
}

#[test]
fn valid_form_produces_trimmed_profile() {
    let profile = valid_form().validate().unwrap();
    assert_eq!(profile.first_name, "Aisyah");
    assert_eq!(profile.email, "aisyah@uts.edu.my");
    assert_eq!(profile.student_id, "20231234");
}

#[test]
fn missing_fields_reported_in_form_order() {
    let form = RegistrationForm { first_name: "  ".into(), email: String::new(), ..valid_form() };
    assert_eq!(form.validate().unwrap_err(), ValidationError::MissingFirstName);

    let form = RegistrationForm { email: String::new(), ..valid_form() };
    assert_eq!(form.validate().unwrap_err(), ValidationError::MissingEmail);

    let form = RegistrationForm { confirm_password: String::new(), ..valid_form() };
    assert_eq!(form.validate().unwrap_err(), ValidationError::MissingConfirmation);
}

#[test]
fn bad_email_rejected_before_student_id() {
    let form = RegistrationForm { email: "not-an-email".into(), student_id: "12".into(), ..valid_form() };
    assert_eq!(form.validate().unwrap_err(), ValidationError::InvalidEmail);
}

#[test]
fn student_id_must_be_eight_digits() {
    let form = RegistrationForm { student_id: "1234567a".into(), ..valid_form() };
    assert_eq!(form.validate().unwrap_err(), ValidationError::InvalidStudentId);
    let form = RegistrationForm { student_id: "123456789".into(), ..valid_form() };
    assert_eq!(form.validate().unwrap_err(), ValidationError::InvalidStudentId);
}

#[test]
fn short_password_rejected() {
    let form = RegistrationForm { password: "abc".into(), confirm_password: "abc".into(), ..valid_form() };
    assert_eq!(form.validate().unwrap_err(), ValidationError::PasswordTooShort);
}

#[test]
fn mismatched_confirmation_rejected() {
    let form = RegistrationForm { confirm_password: "secret2".into(), ..valid_form() };
    assert_eq!(form.validate().unwrap_err(), ValidationError::PasswordMismatch);
}

#[test]
fn terms_must_be_accepted() {
    let form = RegistrationForm { accepted_terms: false, ..valid_form() };
    assert_eq!(form.validate().unwrap_err(), ValidationError::TermsNotAccepted);
}

#[test]
fn email_shapes() {
    assert!(is_valid_email("student@uts.edu.my"));
    assert!(is_valid_email("a@b.co"));
    assert!(!is_valid_email("a@b"));
    assert!(!is_valid_email("@b.co"));
    assert!(!is_valid_email("a@.co"));
    assert!(!is_valid_email("a@b."));
    assert!(!is_valid_email("a b@c.co"));
    assert!(!is_valid_email("a@b@c.co"));
}

#[test]
fn normalize_email_lowercases() {
    assert_eq!(normalize_email(" Jane.Smith@UTS.EDU.MY "), Some("jane.smith@uts.edu.my".to_owned()));
    assert_eq!(normalize_email("nope"), None);
}

#[test]
fn error_messages_are_user_facing() {
    assert_eq!(ValidationError::PasswordTooShort.to_string(), "Password must be at least 6 characters long.");
}
