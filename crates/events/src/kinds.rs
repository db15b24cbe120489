//! Standard event type names shared by platform modules.
//!
//! Event types are free-form `<domain>.<entity>.<verb>` strings; these are the
//! ones the core modules publish. Modules may define their own.

// Users
pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";
pub const USER_LOGIN: &str = "user.login";
pub const USER_LOGOUT: &str = "user.logout";

// Students
pub const STUDENT_ENROLLED: &str = "student.enrolled";
pub const STUDENT_GRADUATED: &str = "student.graduated";
pub const STUDENT_TRANSFERRED: &str = "student.transferred";

// Academic
pub const ACADEMIC_YEAR_CREATED: &str = "academic.year.created";
pub const GRADE_ADDED: &str = "grade.added";
pub const GRADE_UPDATED: &str = "grade.updated";
pub const ASSIGNMENT_CREATED: &str = "assignment.created";
pub const ASSIGNMENT_SUBMITTED: &str = "assignment.submitted";
pub const ATTENDANCE_MARKED: &str = "attendance.marked";
pub const CLASS_SCHEDULED: &str = "class.scheduled";
pub const SEMESTER_STARTED: &str = "semester.started";
pub const SEMESTER_ENDED: &str = "semester.ended";

// Finance
pub const PAYMENT_RECEIVED: &str = "payment.received";
pub const INVOICE_GENERATED: &str = "invoice.generated";
pub const FEE_STRUCTURE_UPDATED: &str = "fee_structure.updated";
pub const SCHOLARSHIP_AWARDED: &str = "scholarship.awarded";

// Communication
pub const MESSAGE_SENT: &str = "message.sent";
pub const NOTIFICATION_CREATED: &str = "notification.created";
pub const ANNOUNCEMENT_PUBLISHED: &str = "announcement.published";
pub const EMAIL_SENT: &str = "email.sent";
pub const SMS_SENT: &str = "sms.sent";

// Modules
pub const MODULE_INSTALLED: &str = "module.installed";
pub const MODULE_UNINSTALLED: &str = "module.uninstalled";
pub const MODULE_ENABLED: &str = "module.enabled";
pub const MODULE_DISABLED: &str = "module.disabled";
pub const MODULE_UPDATED: &str = "module.updated";

// System
pub const BACKUP_COMPLETED: &str = "system.backup.completed";
pub const MAINTENANCE_STARTED: &str = "system.maintenance.started";
pub const MAINTENANCE_COMPLETED: &str = "system.maintenance.completed";
pub const ERROR_OCCURRED: &str = "system.error.occurred";
