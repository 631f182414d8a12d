pub mod category;
pub mod query;
pub mod subtask;
pub mod tag;
pub mod task;
pub mod user;

pub use category::{Category, CategoryInput};
pub use query::{ListParams, ListQuery, NameSort, SortField, SortOrder};
pub use subtask::{NewSubtask, Subtask, SubtaskChanges, SubtaskInput, SubtaskSort, SubtaskUpdateInput};
pub use tag::{Tag, TagInput};
pub use task::{
    FileUploadInput, NewTask, Task, TaskChanges, TaskFile, TaskInput, TaskPriority, TaskSort,
    TaskStatus, TaskUpdateInput,
};
pub use user::{LoginRequest, SignupRequest, User, UserSummary};
